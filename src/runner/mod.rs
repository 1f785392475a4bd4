//! Binding and execution of catalog queries against a [`DocumentStore`].
//!
//! [`bind`] is pure: it substitutes placeholders and checks types without touching the store.
//! [`QueryRunner::execute`] then dispatches the bound operation by kind, passes the call's
//! timeout through uninterpreted, and maps store failures onto [`DbError`]. Nothing is retried.

mod bind;
mod result;

pub use bind::{BoundOperation, BoundQuery, Params, bind};
pub use result::QueryResult;

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::Catalog;
use crate::config::RunnerConfig;
use crate::errors::DbError;
use crate::store::{DocumentStore, ExplainReport, FindOptions};
use crate::utils::logger::METRICS_TARGET;
use crate::utils::num::u128_to_u64_saturating;

/// Executes bound queries for one collection through one store handle.
#[derive(Debug)]
pub struct QueryRunner<S: DocumentStore> {
    store: S,
    catalog: Arc<Catalog>,
    config: RunnerConfig,
}

impl<S: DocumentStore> QueryRunner<S> {
    pub fn new(store: S, catalog: Arc<Catalog>) -> Self {
        Self::with_config(store, catalog, RunnerConfig::default())
    }

    pub fn with_config(store: S, catalog: Arc<Catalog>, config: RunnerConfig) -> Self {
        Self { store, catalog, config }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Look up `name` and bind `params` into it.
    ///
    /// # Errors
    /// `NotFound` for an unregistered name, otherwise whatever [`bind`] reports.
    pub fn bind(&self, name: &str, params: &Params) -> Result<BoundQuery, DbError> {
        bind(self.catalog.get(name)?, params)
    }

    /// Submit `bound` to the store.
    ///
    /// Zero matches for UpdateOne and DeleteOne are successful results.
    ///
    /// # Errors
    /// `IndexConflict` when an index name is reused with other keys; `QueryExecution` wrapping the
    /// store error for every other store failure.
    pub fn execute(&self, bound: &BoundQuery) -> Result<QueryResult, DbError> {
        let collection = self.config.collection.as_str();
        let timeout_ms = bound.timeout_ms().or(self.config.default_timeout_ms);
        let start = Instant::now();
        let result = match bound.operation() {
            BoundOperation::Find { filter, projection, sort, skip, limit } => {
                let options = FindOptions {
                    projection: projection.clone(),
                    sort: sort.clone(),
                    skip: *skip,
                    limit: *limit,
                    timeout_ms,
                };
                self.store.find(collection, filter, &options).map(QueryResult::Documents)
            }
            BoundOperation::UpdateOne { filter, update } => {
                self.store.update_one(collection, filter, update, timeout_ms).map(QueryResult::Updated)
            }
            BoundOperation::DeleteOne { filter } => {
                self.store.delete_one(collection, filter, timeout_ms).map(QueryResult::Deleted)
            }
            BoundOperation::Aggregate { pipeline } => {
                self.store.aggregate(collection, pipeline, timeout_ms).map(QueryResult::Documents)
            }
            BoundOperation::CreateIndex { name, keys } => {
                self.store.create_index(collection, name, keys).map(QueryResult::IndexCreated)
            }
        };
        let duration_ms = u128_to_u64_saturating(start.elapsed().as_millis());
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                log::warn!("query '{}' ({}) failed on '{collection}': {e}", bound.name(), bound.kind());
                return Err(e.into());
            }
        };
        crate::dev6!(
            "{{\"bench\":\"runner\",\"op\":\"{}\",\"query\":\"{}\",\"duration_ms\":{},\"result_count\":{}}}",
            bound.kind(),
            bound.name(),
            duration_ms,
            result.result_count()
        );
        log::info!(
            target: METRICS_TARGET,
            "{}",
            serde_json::json!({
                "query": bound.name(),
                "op": bound.kind().as_str(),
                "collection": collection,
                "duration_ms": duration_ms,
                "result_count": result.result_count(),
            })
        );
        Ok(result)
    }

    /// Catalog lookup, bind, and execute in one call.
    ///
    /// # Errors
    /// Any error of [`QueryRunner::bind`] or [`QueryRunner::execute`].
    pub fn run(&self, name: &str, params: &Params) -> Result<QueryResult, DbError> {
        let bound = self.bind(name, params)?;
        self.execute(&bound)
    }

    /// Ask the store how a bound Find would execute.
    ///
    /// # Errors
    /// `InvalidSpec` for non-find queries; store failures as in [`QueryRunner::execute`].
    pub fn explain(&self, bound: &BoundQuery) -> Result<ExplainReport, DbError> {
        let BoundOperation::Find { filter, projection, sort, skip, limit } = bound.operation() else {
            return Err(DbError::InvalidSpec(format!(
                "{}: explain supports find queries only, not {}",
                bound.name(),
                bound.kind()
            )));
        };
        let options = FindOptions {
            projection: projection.clone(),
            sort: sort.clone(),
            skip: *skip,
            limit: *limit,
            timeout_ms: bound.timeout_ms().or(self.config.default_timeout_ms),
        };
        let report = self.store.explain_find(&self.config.collection, filter, &options)?;
        log::debug!("explain '{}': {:?}", bound.name(), report.plan);
        Ok(report)
    }
}

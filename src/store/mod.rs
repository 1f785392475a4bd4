//! Document store seam.
//!
//! The runner talks to storage only through [`DocumentStore`]. [`MemoryStore`] is the
//! in-process implementation used by the builtin book catalog and the test suite.

pub mod memory;

use bson::Document as BsonDocument;
use serde::Serialize;
use thiserror::Error;

use crate::spec::{IndexKeys, SortSpec};

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Connectivity(String),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("index '{name}' already exists with keys {existing}, requested {requested}")]
    IndexConflict { name: String, existing: IndexKeys, requested: IndexKeys },
    #[error("operation exceeded {0} ms")]
    Timeout(u64),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Options applied by a find after filtering, in the order sort, skip, limit, projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<BsonDocument>,
    pub sort: Option<Vec<SortSpec>>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: u64,
}

/// Acknowledgment of an index creation. Identical for a fresh build and an idempotent repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexAck {
    pub name: String,
    pub keys: IndexKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ExplainPlan {
    CollectionScan,
    IndexScan { index: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainReport {
    pub plan: ExplainPlan,
    pub docs_examined: u64,
    pub returned: u64,
}

/// Abstract document store executing already-bound queries.
pub trait DocumentStore: Send + Sync {
    /// # Errors
    /// Returns a [`StoreError`] if the filter or options are rejected or the operation times out.
    fn find(
        &self,
        collection: &str,
        filter: &BsonDocument,
        options: &FindOptions,
    ) -> Result<Vec<BsonDocument>, StoreError>;

    /// Update at most one matching document.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the filter or update is rejected.
    fn update_one(
        &self,
        collection: &str,
        filter: &BsonDocument,
        update: &BsonDocument,
        timeout_ms: Option<u64>,
    ) -> Result<UpdateReport, StoreError>;

    /// Delete at most one matching document.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the filter is rejected.
    fn delete_one(
        &self,
        collection: &str,
        filter: &BsonDocument,
        timeout_ms: Option<u64>,
    ) -> Result<DeleteReport, StoreError>;

    /// # Errors
    /// Returns a [`StoreError`] if a stage is malformed or unsupported.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[BsonDocument],
        timeout_ms: Option<u64>,
    ) -> Result<Vec<BsonDocument>, StoreError>;

    /// Idempotent for identical keys.
    ///
    /// # Errors
    /// Returns [`StoreError::IndexConflict`] if `name` already exists with different keys.
    fn create_index(&self, collection: &str, name: &str, keys: &IndexKeys) -> Result<IndexAck, StoreError>;

    /// Describe how [`DocumentStore::find`] would execute, without returning documents.
    ///
    /// # Errors
    /// Same as [`DocumentStore::find`].
    fn explain_find(
        &self,
        collection: &str,
        filter: &BsonDocument,
        options: &FindOptions,
    ) -> Result<ExplainReport, StoreError>;
}

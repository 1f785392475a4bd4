//! Reusable, parameterized query templates for a document collection.
//!
//! Specs are registered once in a [`Catalog`], bound with [`Params`] into a [`BoundQuery`], and
//! executed by a [`QueryRunner`] against any [`DocumentStore`]. [`MemoryStore`] is the bundled
//! in-process store.
//!
//! ```no_run
//! use shelfquery::{MemoryStore, Params, QueryRunner, catalog::books};
//!
//! let store = MemoryStore::new();
//! store.load_json_array("books", r#"[{"title": "Deep Work", "author": "Cal Newport"}]"#)?;
//! let runner = QueryRunner::new(store, books::builtin()?.into_shared());
//! let found = runner.run("by_author", &Params::new().with("author", "Cal Newport"))?;
//! assert_eq!(found.documents().map(<[_]>::len), Some(1));
//! # Ok::<(), shelfquery::DbError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod document;
pub mod errors;
pub mod runner;
pub mod spec;
pub mod store;
pub mod types;
pub mod utils;

pub use catalog::Catalog;
pub use config::{LogConfig, RunnerConfig};
pub use errors::DbError;
pub use runner::{BoundOperation, BoundQuery, Params, QueryResult, QueryRunner, bind};
pub use spec::{FieldType, IndexKeys, Order, ParamType, QueryKind, QuerySpec, SortSpec, Template};
pub use store::{
    DeleteReport, DocumentStore, ExplainPlan, ExplainReport, FindOptions, IndexAck, MemoryStore,
    StoreError, UpdateReport,
};

/// Configure logging from `SHELFQUERY_*` environment variables.
///
/// # Errors
/// Returns [`DbError::Config`] if the log directory or appenders cannot be created.
pub fn init() -> Result<(), DbError> {
    utils::logger::configure_from_env().map_err(|e| DbError::Config(e.to_string()))
}

/// Build a runner from a [`RunnerConfig`]: logging is configured from `config.log` first.
///
/// # Errors
/// Returns [`DbError::Config`] if logging cannot be configured.
pub fn runner_from_config<S: DocumentStore>(
    store: S,
    catalog: std::sync::Arc<Catalog>,
    config: RunnerConfig,
) -> Result<QueryRunner<S>, DbError> {
    utils::logger::configure_from_config(&config.log).map_err(|e| DbError::Config(e.to_string()))?;
    log::info!("runner targeting collection '{}'", config.collection);
    Ok(QueryRunner::with_config(store, catalog, config))
}

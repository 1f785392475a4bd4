use crate::spec::IndexKeys;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Query already registered: {0}")]
    DuplicateName(String),

    #[error("Query not found: {0}")]
    NotFound(String),

    #[error("Missing parameter '{param}' for query '{query}'")]
    MissingParameter { query: String, param: String },

    #[error("Type mismatch for '{param}' in query '{query}': expected {expected}, found {found}")]
    TypeMismatch { query: String, param: String, expected: String, found: String },

    #[error("Index conflict: '{name}' exists with keys {existing}, requested {requested}")]
    IndexConflict { name: String, existing: IndexKeys, requested: IndexKeys },

    #[error("Query execution failed: {source}")]
    QueryExecution {
        #[source]
        source: StoreError,
    },

    #[error("Invalid query spec: {0}")]
    InvalidSpec(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Global catalog already initialized")]
    CatalogAlreadyInitialized,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::IndexConflict { name, existing, requested } => {
                Self::IndexConflict { name, existing, requested }
            }
            other => Self::QueryExecution { source: other },
        }
    }
}

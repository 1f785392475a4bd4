//! Runner and logging configuration, loaded from TOML and overridden from the environment.
//!
//! ```toml
//! collection = "books"
//! default_timeout_ms = 2000
//!
//! [log]
//! dir = "logs"
//! level = "debug"
//! retention = 3
//! dev6 = false
//! ```

use crate::errors::DbError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_COLLECTION: &str = "books";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: String,
    pub retention: usize,
    pub dev6: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { dir: None, level: "info".to_string(), retention: 7, dev6: false }
    }
}

impl LogConfig {
    /// Override fields from `SHELFQUERY_LOG_*` variables resolved through `lookup`.
    ///
    /// # Errors
    /// Returns `DbError::Config` when `SHELFQUERY_LOG_RETENTION` is not a count.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("SHELFQUERY_LOG_DIR") {
            self.dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup("SHELFQUERY_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(r) = lookup("SHELFQUERY_LOG_RETENTION") {
            self.retention = r
                .parse::<usize>()
                .map_err(|e| DbError::Config(format!("SHELFQUERY_LOG_RETENTION={r}: {e}")))?;
        }
        if let Some(v) = lookup("SHELFQUERY_DEV6") {
            self.dev6 = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }
}

/// Settings shared by every [`QueryRunner`](crate::runner::QueryRunner) built from them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Collection every query targets.
    pub collection: String,
    /// Timeout forwarded to the store when a call does not carry its own.
    pub default_timeout_ms: Option<u64>,
    pub log: LogConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { collection: DEFAULT_COLLECTION.to_string(), default_timeout_ms: None, log: LogConfig::default() }
    }
}

impl RunnerConfig {
    /// # Errors
    /// Returns an error on malformed TOML or an empty collection name.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| DbError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&s)
    }

    /// Override fields from `SHELFQUERY_*` variables resolved through `lookup`.
    ///
    /// # Errors
    /// Returns `DbError::Config` when a variable is present but malformed.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(c) = lookup("SHELFQUERY_COLLECTION") {
            self.collection = c;
        }
        if let Some(t) = lookup("SHELFQUERY_TIMEOUT_MS") {
            let ms = t
                .parse::<u64>()
                .map_err(|e| DbError::Config(format!("SHELFQUERY_TIMEOUT_MS={t}: {e}")))?;
            self.default_timeout_ms = Some(ms);
        }
        self.log.apply_env_with(&lookup)?;
        self.validate()
    }

    /// Override fields from the process environment.
    ///
    /// # Errors
    /// Returns `DbError::Config` when a variable is present but malformed.
    pub fn apply_env(&mut self) -> Result<(), DbError> {
        self.apply_env_with(|k| std::env::var(k).ok())
    }

    fn validate(&self) -> Result<(), DbError> {
        if self.collection.trim().is_empty() {
            return Err(DbError::Config("collection name must not be empty".into()));
        }
        Ok(())
    }
}

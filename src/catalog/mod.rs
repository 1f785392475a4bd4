//! Named, validated query specs.
//!
//! A [`Catalog`] is filled with `&mut self` during start-up and then shared as `Arc<Catalog>`;
//! after that it is read-only and needs no locking. One catalog per process may be installed
//! with [`init_global`].

pub mod books;
mod file;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::errors::DbError;
use crate::spec::QuerySpec;

static GLOBAL: OnceLock<Arc<Catalog>> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    specs: BTreeMap<String, Arc<QuerySpec>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add `spec` under its name.
    ///
    /// # Errors
    /// `DuplicateName` if the name is taken, or the spec's own validation error.
    pub fn register(&mut self, spec: QuerySpec) -> Result<(), DbError> {
        if self.specs.contains_key(spec.name()) {
            return Err(DbError::DuplicateName(spec.name().to_string()));
        }
        spec.validate()?;
        log::debug!("registered {} query '{}'", spec.kind(), spec.name());
        self.specs.insert(spec.name().to_string(), Arc::new(spec));
        Ok(())
    }

    /// # Errors
    /// `NotFound` if no spec is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<QuerySpec>, DbError> {
        self.specs.get(name).cloned().ok_or_else(|| DbError::NotFound(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuerySpec> {
        self.specs.values().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Install the process-wide catalog.
///
/// # Errors
/// `CatalogAlreadyInitialized` on every call after the first.
pub fn init_global(catalog: Catalog) -> Result<Arc<Catalog>, DbError> {
    let shared = Arc::new(catalog);
    GLOBAL.set(Arc::clone(&shared)).map_err(|_| DbError::CatalogAlreadyInitialized)?;
    log::info!("global catalog initialized with {} queries", shared.len());
    Ok(shared)
}

#[must_use]
pub fn global() -> Option<Arc<Catalog>> {
    GLOBAL.get().cloned()
}

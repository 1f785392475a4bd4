//! TOML catalog files.
//!
//! ```toml
//! [[query]]
//! name = "published_after"
//! kind = "find"
//! filter = { published_year = { "$gt" = "$year" } }
//! params = [{ name = "year", type = "int" }]
//! sort = [{ field = "published_year", order = "desc" }]
//!
//! [[query]]
//! name = "index_title"
//! kind = "create_index"
//! keys = [{ field = "title" }]
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::Catalog;
use crate::errors::DbError;
use crate::spec::{FieldType, IndexKeys, Placeholder, QueryKind, QuerySpec, SortSpec};
use crate::utils::json::{json_value_to_bson_document, json_value_to_bson_documents};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    query: Vec<QueryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryEntry {
    name: String,
    kind: QueryKind,
    description: Option<String>,
    filter: Option<serde_json::Value>,
    update: Option<serde_json::Value>,
    pipeline: Option<serde_json::Value>,
    keys: Option<Vec<SortSpec>>,
    index_name: Option<String>,
    #[serde(default)]
    params: Vec<Placeholder>,
    projection: Option<serde_json::Value>,
    sort: Option<Vec<SortSpec>>,
    skip: Option<u64>,
    limit: Option<u64>,
    #[serde(default)]
    field_types: BTreeMap<String, FieldType>,
}

impl QueryEntry {
    fn into_spec(self) -> Result<QuerySpec, DbError> {
        let name = self.name;
        let missing = |field: &str| DbError::InvalidSpec(format!("{name}: {field} is required for {}", self.kind));
        let filter = self.filter.as_ref().map(json_value_to_bson_document).transpose()?.unwrap_or_default();
        let mut spec = match self.kind {
            QueryKind::Find => QuerySpec::find(name.clone(), filter),
            QueryKind::DeleteOne => QuerySpec::delete_one(name.clone(), filter),
            QueryKind::UpdateOne => {
                let update = self.update.as_ref().ok_or_else(|| missing("update"))?;
                QuerySpec::update_one(name.clone(), filter, json_value_to_bson_document(update)?)
            }
            QueryKind::Aggregate => {
                let pipeline = self.pipeline.as_ref().ok_or_else(|| missing("pipeline"))?;
                QuerySpec::aggregate(name.clone(), json_value_to_bson_documents(pipeline)?)
            }
            QueryKind::CreateIndex => {
                let keys = self.keys.ok_or_else(|| missing("keys"))?;
                QuerySpec::create_index(name.clone(), IndexKeys::new(keys))
            }
        };
        if let Some(d) = self.description {
            spec = spec.with_description(d);
        }
        for p in self.params {
            spec = spec.with_param(p.name, p.ty);
        }
        if let Some(p) = &self.projection {
            spec = spec.with_projection(json_value_to_bson_document(p)?);
        }
        if let Some(sort) = self.sort {
            spec = spec.with_sort(sort);
        }
        if let Some(skip) = self.skip {
            spec = spec.with_skip(skip);
        }
        if let Some(limit) = self.limit {
            spec = spec.with_limit(limit);
        }
        for (field, ty) in self.field_types {
            spec = spec.with_field_type(field, ty);
        }
        if let Some(n) = self.index_name {
            spec = spec.with_index_name(n);
        }
        Ok(spec)
    }
}

impl Catalog {
    /// Parse `[[query]]` tables and register each one, in file order.
    ///
    /// # Errors
    /// `Toml` for syntax or shape errors, `InvalidSpec` for entries missing their template, and
    /// any registration error.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        let file: CatalogFile = toml::from_str(s)?;
        let mut catalog = Self::new();
        for entry in file.query {
            catalog.register(entry.into_spec()?)?;
        }
        Ok(catalog)
    }

    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`Catalog::from_toml_str`].
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DbError::Io(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_toml_str(&text)?;
        log::info!("loaded {} queries from {}", catalog.len(), path.display());
        Ok(catalog)
    }
}

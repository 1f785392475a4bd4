//! Immutable descriptions of query shapes.
//!
//! A [`QuerySpec`] is built once, validated when it is registered in a
//! [`Catalog`](crate::catalog::Catalog), and shared read-only afterwards.

mod placeholder;
mod types;

pub(crate) use placeholder::lookup as lookup_placeholder;
pub use types::{
    FieldType, IndexKeys, Order, ParamType, Placeholder, QueryKind, SortSpec, Template,
    bson_type_name, is_numeric,
};

use crate::errors::DbError;
use bson::Document as BsonDocument;
use placeholder::{operator_field_refs, template_documents, visit_document_strings};
use std::collections::BTreeSet;
pub(crate) use types::{RANGE_OPERATORS, STRING_OPERATORS};

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    name: String,
    kind: QueryKind,
    description: Option<String>,
    template: Template,
    params: Vec<Placeholder>,
    default_projection: Option<BsonDocument>,
    default_sort: Option<Vec<SortSpec>>,
    default_skip: Option<u64>,
    default_limit: Option<u64>,
    field_types: Vec<(String, FieldType)>,
    index_name: Option<String>,
}

impl QuerySpec {
    fn with_template(name: impl Into<String>, kind: QueryKind, template: Template) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            template,
            params: Vec::new(),
            default_projection: None,
            default_sort: None,
            default_skip: None,
            default_limit: None,
            field_types: Vec::new(),
            index_name: None,
        }
    }

    pub fn find(name: impl Into<String>, filter: BsonDocument) -> Self {
        Self::with_template(name, QueryKind::Find, Template::Filter(filter))
    }

    pub fn update_one(name: impl Into<String>, filter: BsonDocument, update: BsonDocument) -> Self {
        Self::with_template(name, QueryKind::UpdateOne, Template::Update { filter, update })
    }

    pub fn delete_one(name: impl Into<String>, filter: BsonDocument) -> Self {
        Self::with_template(name, QueryKind::DeleteOne, Template::Filter(filter))
    }

    pub fn aggregate(name: impl Into<String>, pipeline: Vec<BsonDocument>) -> Self {
        Self::with_template(name, QueryKind::Aggregate, Template::Pipeline(pipeline))
    }

    pub fn create_index(name: impl Into<String>, keys: IndexKeys) -> Self {
        Self::with_template(name, QueryKind::CreateIndex, Template::IndexKeys(keys))
    }

    /// Declare a placeholder `"$<name>"` and the type of value it accepts.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(Placeholder { name: name.into(), ty });
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_projection(mut self, projection: BsonDocument) -> Self {
        self.default_projection = Some(projection);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.default_sort = Some(sort);
        self
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: u64) -> Self {
        self.default_skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Record the stored type of a collection field, checked against string operators at registration.
    #[must_use]
    pub fn with_field_type(mut self, field: impl Into<String>, ty: FieldType) -> Self {
        self.field_types.push((field.into(), ty));
        self
    }

    #[must_use]
    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub const fn kind(&self) -> QueryKind {
        self.kind
    }

    #[must_use]
    pub const fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub fn params(&self) -> &[Placeholder] {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Placeholder> {
        self.params.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub const fn default_projection(&self) -> Option<&BsonDocument> {
        self.default_projection.as_ref()
    }

    #[must_use]
    pub fn default_sort(&self) -> Option<&[SortSpec]> {
        self.default_sort.as_deref()
    }

    #[must_use]
    pub const fn default_skip(&self) -> Option<u64> {
        self.default_skip
    }

    #[must_use]
    pub const fn default_limit(&self) -> Option<u64> {
        self.default_limit
    }

    #[must_use]
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.field_types.iter().find(|(f, _)| f == field).map(|(_, t)| *t)
    }

    #[must_use]
    pub fn field_types(&self) -> &[(String, FieldType)] {
        &self.field_types
    }

    /// Explicit index name, or the key-derived default for CreateIndex specs.
    #[must_use]
    pub fn index_name(&self) -> Option<String> {
        match (&self.index_name, &self.template) {
            (Some(n), _) => Some(n.clone()),
            (None, Template::IndexKeys(keys)) => Some(keys.default_name()),
            _ => None,
        }
    }

    /// Check the spec's internal consistency. Called by the catalog on registration.
    ///
    /// # Errors
    /// `InvalidSpec` for structural problems, `TypeMismatch` when a declared type can never be
    /// valid where its placeholder or field is used.
    pub fn validate(&self) -> Result<(), DbError> {
        let invalid = |msg: String| Err(DbError::InvalidSpec(format!("{}: {msg}", self.name)));
        if self.name.trim().is_empty() {
            return Err(DbError::InvalidSpec("query name must not be empty".into()));
        }
        match &self.template {
            Template::Pipeline(stages) if stages.is_empty() => {
                return invalid("aggregation pipeline is empty".into());
            }
            Template::IndexKeys(keys) if keys.0.is_empty() => {
                return invalid("index keys are empty".into());
            }
            Template::Update { update, .. } => {
                if update.is_empty() {
                    return invalid("update document is empty".into());
                }
                if let Some(k) = update.keys().find(|k| !k.starts_with('$')) {
                    return invalid(format!("update key '{k}' is not an update operator"));
                }
            }
            _ => {}
        }
        if self.kind() != QueryKind::Find
            && (self.default_projection.is_some()
                || self.default_sort.is_some()
                || self.default_skip.is_some()
                || self.default_limit.is_some())
        {
            return invalid("projection, sort and pagination apply to find queries only".into());
        }

        let mut declared = BTreeSet::new();
        for p in &self.params {
            if !declared.insert(p.name.as_str()) {
                return invalid(format!("parameter '{}' declared twice", p.name));
            }
        }

        let mut used = BTreeSet::new();
        let mut range_misuse: Option<&Placeholder> = None;
        for d in template_documents(&self.template) {
            visit_document_strings(d, &mut |key, s| {
                if let Some(p) = lookup_placeholder(s, &self.params) {
                    used.insert(p.name.as_str());
                    if key.is_some_and(|k| RANGE_OPERATORS.contains(&k))
                        && !p.ty.is_orderable()
                        && range_misuse.is_none()
                    {
                        range_misuse = Some(p);
                    }
                }
            });
        }
        if let Some(p) = range_misuse {
            return Err(DbError::TypeMismatch {
                query: self.name.clone(),
                param: p.name.clone(),
                expected: "number or datetime".into(),
                found: p.ty.to_string(),
            });
        }
        if let Some(unused) = declared.difference(&used).next() {
            return invalid(format!("parameter '{unused}' does not occur in the template"));
        }

        if let Template::Pipeline(stages) = &self.template {
            let mut refs = Vec::new();
            for s in stages {
                operator_field_refs(s, &STRING_OPERATORS, &mut refs);
            }
            for (op, field) in refs {
                if let Some(ty) = self.field_type(field)
                    && ty != ParamType::String
                {
                    return Err(DbError::TypeMismatch {
                        query: self.name.clone(),
                        param: field.to_string(),
                        expected: format!("string operand for {op}"),
                        found: ty.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

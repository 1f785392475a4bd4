use bson::{Bson, Document as BsonDocument};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::DbError;
use crate::spec::{
    IndexKeys, QueryKind, QuerySpec, RANGE_OPERATORS, SortSpec, Template, bson_type_name,
    is_numeric, lookup_placeholder,
};
use crate::utils::num::i64_to_u64;

/// Values for one call: named placeholder values plus per-call pagination and timeout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Bson>,
    skip: Option<i64>,
    limit: Option<i64>,
    timeout_ms: Option<u64>,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Bson>) {
        self.values.insert(name.into(), value.into());
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Bson> {
        self.values.get(name)
    }

    #[must_use]
    pub const fn skip(&self) -> Option<i64> {
        self.skip
    }

    #[must_use]
    pub const fn limit(&self) -> Option<i64> {
        self.limit
    }

    #[must_use]
    pub const fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Concrete operation ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundOperation {
    Find {
        filter: BsonDocument,
        projection: Option<BsonDocument>,
        sort: Option<Vec<SortSpec>>,
        skip: Option<u64>,
        limit: Option<u64>,
    },
    UpdateOne { filter: BsonDocument, update: BsonDocument },
    DeleteOne { filter: BsonDocument },
    Aggregate { pipeline: Vec<BsonDocument> },
    CreateIndex { name: String, keys: IndexKeys },
}

/// A spec with every placeholder substituted. Only [`bind`] constructs one.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    spec: Arc<QuerySpec>,
    operation: BoundOperation,
    timeout_ms: Option<u64>,
}

impl BoundQuery {
    #[must_use]
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.spec.kind()
    }

    #[must_use]
    pub const fn operation(&self) -> &BoundOperation {
        &self.operation
    }

    #[must_use]
    pub const fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }
}

struct Binder<'a> {
    spec: &'a QuerySpec,
    params: &'a Params,
}

impl Binder<'_> {
    fn doc(&self, d: &BsonDocument) -> Result<BsonDocument, DbError> {
        let mut out = BsonDocument::new();
        for (k, v) in d {
            out.insert(k.clone(), self.value(v, Some(k.as_str()))?);
        }
        Ok(out)
    }

    // `key` is the key holding `v`; array elements inherit it.
    fn value(&self, v: &Bson, key: Option<&str>) -> Result<Bson, DbError> {
        match v {
            Bson::String(s) => match lookup_placeholder(s, self.spec.params()) {
                Some(p) => {
                    let value = self.params.get(&p.name).ok_or_else(|| DbError::MissingParameter {
                        query: self.spec.name().to_string(),
                        param: p.name.clone(),
                    })?;
                    if !p.ty.accepts(value) {
                        return Err(self.mismatch(&p.name, p.ty.as_str(), value));
                    }
                    if key.is_some_and(|k| RANGE_OPERATORS.contains(&k))
                        && !is_numeric(value)
                        && !matches!(value, Bson::DateTime(_))
                    {
                        return Err(self.mismatch(&p.name, "number or datetime", value));
                    }
                    Ok(value.clone())
                }
                None => Ok(v.clone()),
            },
            Bson::Document(d) => Ok(Bson::Document(self.doc(d)?)),
            Bson::Array(items) => {
                Ok(Bson::Array(items.iter().map(|i| self.value(i, key)).collect::<Result<_, _>>()?))
            }
            other => Ok(other.clone()),
        }
    }

    fn mismatch(&self, param: &str, expected: &str, found: &Bson) -> DbError {
        DbError::TypeMismatch {
            query: self.spec.name().to_string(),
            param: param.to_string(),
            expected: expected.to_string(),
            found: bson_type_name(found).to_string(),
        }
    }
}

fn pagination(what: &str, per_call: Option<i64>, default: Option<u64>) -> Result<Option<u64>, DbError> {
    match per_call {
        Some(v) => i64_to_u64(v)
            .map(Some)
            .ok_or_else(|| DbError::InvalidPagination(format!("{what} must be non-negative, got {v}"))),
        None => Ok(default),
    }
}

/// Substitute `params` into `spec`, checking presence and types of every placeholder.
///
/// Nothing here touches a store, so a failed bind never produces a partial submission.
///
/// # Errors
/// `MissingParameter` when a declared placeholder has no value, `TypeMismatch` when a value does
/// not fit its declared type or sits under a range operator without being a number or datetime,
/// and `InvalidPagination` for negative skip/limit or pagination on a non-find query.
pub fn bind(spec: Arc<QuerySpec>, params: &Params) -> Result<BoundQuery, DbError> {
    for name in params.names() {
        if spec.param(name).is_none() {
            log::debug!("query '{}': ignoring undeclared parameter '{name}'", spec.name());
        }
    }
    if spec.kind() != QueryKind::Find && (params.skip().is_some() || params.limit().is_some()) {
        return Err(DbError::InvalidPagination(format!(
            "query '{}' is a {} query; skip and limit apply to find only",
            spec.name(),
            spec.kind()
        )));
    }

    let b = Binder { spec: &spec, params };
    let operation = match spec.template() {
        Template::Filter(filter) if spec.kind() == QueryKind::Find => BoundOperation::Find {
            filter: b.doc(filter)?,
            projection: spec.default_projection().cloned(),
            sort: spec.default_sort().map(<[SortSpec]>::to_vec),
            skip: pagination("skip", params.skip(), spec.default_skip())?,
            limit: pagination("limit", params.limit(), spec.default_limit())?,
        },
        Template::Filter(filter) => BoundOperation::DeleteOne { filter: b.doc(filter)? },
        Template::Update { filter, update } => {
            BoundOperation::UpdateOne { filter: b.doc(filter)?, update: b.doc(update)? }
        }
        Template::Pipeline(stages) => BoundOperation::Aggregate {
            pipeline: stages.iter().map(|s| b.doc(s)).collect::<Result<_, _>>()?,
        },
        Template::IndexKeys(keys) => BoundOperation::CreateIndex {
            name: spec.index_name().unwrap_or_else(|| keys.default_name()),
            keys: keys.clone(),
        },
    };
    let timeout_ms = params.timeout_ms();
    Ok(BoundQuery { spec, operation, timeout_ms })
}

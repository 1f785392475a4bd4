use bson::{Bson, Document as BsonDocument};

use crate::store::StoreError;

pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;

/// Find-style projection: inclusion or exclusion of top-level fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Projection {
    fields: Vec<String>,
    inclusive: bool,
    keep_id: bool,
}

fn flag(field: &str, v: &Bson) -> Result<bool, StoreError> {
    match v {
        Bson::Boolean(b) => Ok(*b),
        Bson::Int32(i) => Ok(*i != 0),
        Bson::Int64(i) => Ok(*i != 0),
        Bson::Double(f) => Ok(*f != 0.0),
        other => Err(StoreError::Unsupported(format!("projection expression for '{field}': {other}"))),
    }
}

impl Projection {
    pub(crate) fn parse(doc: &BsonDocument) -> Result<Self, StoreError> {
        if doc.len() > MAX_PROJECTION_FIELDS {
            return Err(StoreError::Malformed(format!("projection exceeds {MAX_PROJECTION_FIELDS} fields")));
        }
        let mut keep_id = true;
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for (k, v) in doc {
            if k.contains('.') || k.starts_with('$') {
                return Err(StoreError::Unsupported(format!("projection path '{k}'")));
            }
            let on = flag(k, v)?;
            if k == "_id" {
                keep_id = on;
            } else if on {
                included.push(k.clone());
            } else {
                excluded.push(k.clone());
            }
        }
        if !included.is_empty() && !excluded.is_empty() {
            return Err(StoreError::Malformed(
                "projection cannot mix inclusion and exclusion".into(),
            ));
        }
        let inclusive = !included.is_empty();
        Ok(Self { fields: if inclusive { included } else { excluded }, inclusive, keep_id })
    }

    pub(crate) fn apply(&self, doc: &BsonDocument) -> BsonDocument {
        let mut out = BsonDocument::new();
        for (k, v) in doc {
            let keep = if k == "_id" {
                self.keep_id
            } else if self.inclusive {
                self.fields.iter().any(|f| f == k)
            } else {
                !self.fields.iter().any(|f| f == k)
            };
            if keep {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

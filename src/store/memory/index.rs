use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use super::value::get_path;
use crate::spec::IndexKeys;
use crate::store::StoreError;
use crate::utils::num::{bson_to_f64, u128_to_u64_saturating};

/// Orderable key for the leading field of an index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum IndexKey {
    Bool(bool),
    Num(OrderedFloat<f64>),
    Str(String),
    Oid(ObjectId),
    Date(i64),
}

// Every numeric type shares one key space so `20`, `20.0` and decimal `20` land together.
// Keys may collide where `f64` loses precision; scans re-check candidates against the filter.
pub(crate) fn key_from_bson(v: &Bson) -> Option<IndexKey> {
    match v {
        Bson::String(s) => Some(IndexKey::Str(s.clone())),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => {
            bson_to_f64(v).map(|f| IndexKey::Num(OrderedFloat(f)))
        }
        Bson::Boolean(b) => Some(IndexKey::Bool(*b)),
        Bson::ObjectId(o) => Some(IndexKey::Oid(*o)),
        Bson::DateTime(d) => Some(IndexKey::Date(d.timestamp_millis())),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IndexStats {
    pub keys: usize,
    pub entries: usize,
    pub build_time_ms: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct BTreeIndex {
    pub keys: IndexKeys,
    field: String,
    map: BTreeMap<IndexKey, BTreeSet<u64>>,
    pub stats: IndexStats,
}

impl BTreeIndex {
    fn new(keys: IndexKeys) -> Self {
        let field = keys.leading_field().unwrap_or_default().to_string();
        Self { keys, field, map: BTreeMap::new(), stats: IndexStats::default() }
    }

    pub(crate) fn field(&self) -> &str {
        &self.field
    }

    // Array values index every element.
    fn keys_of(&self, doc: &BsonDocument) -> Vec<IndexKey> {
        match get_path(doc, &self.field) {
            Some(Bson::Array(items)) => items.iter().filter_map(key_from_bson).collect(),
            Some(v) => key_from_bson(v).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, doc: &BsonDocument, seq: u64) {
        for k in self.keys_of(doc) {
            if self.map.entry(k).or_default().insert(seq) {
                self.stats.entries += 1;
            }
        }
        self.stats.keys = self.map.len();
    }

    pub(crate) fn remove(&mut self, doc: &BsonDocument, seq: u64) {
        for k in self.keys_of(doc) {
            if let Some(set) = self.map.get_mut(&k) {
                if set.remove(&seq) {
                    self.stats.entries = self.stats.entries.saturating_sub(1);
                }
                if set.is_empty() {
                    self.map.remove(&k);
                }
            }
        }
        self.stats.keys = self.map.len();
    }

    /// Sequence numbers whose leading field equals `v`; `None` when `v` is not indexable.
    pub(crate) fn lookup_eq(&self, v: &Bson) -> Option<BTreeSet<u64>> {
        let k = key_from_bson(v)?;
        Some(self.map.get(&k).cloned().unwrap_or_default())
    }
}

/// Named indexes of one collection.
#[derive(Debug, Clone, Default)]
pub(crate) struct IndexRegistry {
    indexes: BTreeMap<String, BTreeIndex>,
}

impl IndexRegistry {
    /// Create `name` over `keys` and build it from `docs`. Re-creating an identical index is a no-op.
    pub(crate) fn ensure<'a>(
        &mut self,
        name: &str,
        keys: &IndexKeys,
        docs: impl Iterator<Item = (u64, &'a BsonDocument)>,
    ) -> Result<bool, StoreError> {
        if let Some(existing) = self.indexes.get(name) {
            if &existing.keys == keys {
                return Ok(false);
            }
            return Err(StoreError::IndexConflict {
                name: name.to_string(),
                existing: existing.keys.clone(),
                requested: keys.clone(),
            });
        }
        let start = Instant::now();
        let mut idx = BTreeIndex::new(keys.clone());
        for (seq, doc) in docs {
            idx.insert(doc, seq);
        }
        idx.stats.build_time_ms = u128_to_u64_saturating(start.elapsed().as_millis());
        self.indexes.insert(name.to_string(), idx);
        Ok(true)
    }

    pub(crate) fn insert_all(&mut self, doc: &BsonDocument, seq: u64) {
        for idx in self.indexes.values_mut() {
            idx.insert(doc, seq);
        }
    }

    pub(crate) fn remove_all(&mut self, doc: &BsonDocument, seq: u64) {
        for idx in self.indexes.values_mut() {
            idx.remove(doc, seq);
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&BTreeIndex> {
        self.indexes.get(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &BTreeIndex)> {
        self.indexes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SortSpec;
    use bson::doc;

    fn title_keys() -> IndexKeys {
        IndexKeys::new(vec![SortSpec::asc("title")])
    }

    #[test]
    fn ensure_is_idempotent_and_detects_conflicts() {
        let docs = [doc! {"title": "Deep Work"}];
        let mut reg = IndexRegistry::default();
        assert!(reg.ensure("title_1", &title_keys(), docs.iter().enumerate().map(|(i, d)| (i as u64, d))).unwrap());
        assert!(!reg.ensure("title_1", &title_keys(), std::iter::empty()).unwrap());
        let other = IndexKeys::new(vec![SortSpec::desc("title")]);
        match reg.ensure("title_1", &other, std::iter::empty()) {
            Err(StoreError::IndexConflict { name, existing, requested }) => {
                assert_eq!(name, "title_1");
                assert_eq!(existing, title_keys());
                assert_eq!(requested, other);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn eq_lookup_numeric_and_multikey() {
        let mut reg = IndexRegistry::default();
        let keys = IndexKeys::new(vec![SortSpec::asc("price")]);
        reg.ensure("price_1", &keys, std::iter::empty()).unwrap();
        reg.insert_all(&doc! {"price": 20}, 1);
        reg.insert_all(&doc! {"price": [20.0, 30]}, 2);
        reg.insert_all(&doc! {"other": 1}, 3);
        let idx = reg.get("price_1").unwrap();
        let hits = idx.lookup_eq(&Bson::Double(20.0)).unwrap();
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(idx.lookup_eq(&Bson::Document(doc! {})).is_none());

        reg.remove_all(&doc! {"price": 20}, 1);
        let idx = reg.get("price_1").unwrap();
        assert_eq!(idx.lookup_eq(&Bson::Int32(20)).unwrap().len(), 1);
        assert_eq!(idx.stats.entries, 2);
    }
}

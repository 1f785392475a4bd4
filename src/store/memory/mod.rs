//! In-process [`DocumentStore`] over BSON documents.
//!
//! Collections are created on first write. Documents keep insertion order ("natural order"),
//! which is also the tie-break order of every sort. Indexes cover the leading key field and are
//! only used to narrow equality lookups; every candidate is re-checked against the full filter.

mod aggregate;
mod expr;
mod filter;
mod index;
mod project;
mod update;
mod value;

use bson::Document as BsonDocument;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use self::filter::Filter;
use self::index::IndexRegistry;
use self::project::Projection;
use self::update::UpdateDoc;
use self::value::compare_docs;
use super::{
    DeleteReport, DocumentStore, ExplainPlan, ExplainReport, FindOptions, IndexAck, StoreError,
    UpdateReport,
};
use crate::document::Document;
use crate::errors::DbError;
use crate::spec::IndexKeys;
use crate::types::{CollectionName, DocumentId};
use crate::utils::logger::AUDIT_TARGET;
use crate::utils::num::{u64_to_usize, usize_to_u64};

const MAX_SORT_FIELDS: usize = 32;

#[derive(Debug, Default)]
struct MemCollection {
    docs: BTreeMap<u64, Document>,
    next_seq: u64,
    indexes: IndexRegistry,
}

impl MemCollection {
    fn insert(&mut self, doc: Document) -> DocumentId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = doc.id;
        self.indexes.insert_all(&doc.data, seq);
        self.docs.insert(seq, doc);
        id
    }

    // Candidate sequence numbers in natural order, narrowed by an index when the filter pins
    // an equality on some index's leading field.
    fn plan(&self, filter: &Filter) -> (ExplainPlan, Vec<u64>) {
        for (name, idx) in self.indexes.iter() {
            if let Some(v) = filter.eq_value(idx.field())
                && let Some(hits) = idx.lookup_eq(v)
            {
                return (ExplainPlan::IndexScan { index: name.clone() }, hits.into_iter().collect());
            }
        }
        (ExplainPlan::CollectionScan, self.docs.keys().copied().collect())
    }

    fn first_match(&self, filter: &Filter, deadline: Option<(Instant, u64)>) -> Result<Option<u64>, StoreError> {
        let (_, candidates) = self.plan(filter);
        for seq in candidates {
            check_deadline(deadline)?;
            if self.docs.get(&seq).is_some_and(|d| filter.matches(&d.data)) {
                return Ok(Some(seq));
            }
        }
        Ok(None)
    }
}

fn deadline(timeout_ms: Option<u64>) -> Option<(Instant, u64)> {
    timeout_ms.map(|ms| (Instant::now() + Duration::from_millis(ms), ms))
}

fn check_deadline(deadline: Option<(Instant, u64)>) -> Result<(), StoreError> {
    match deadline {
        Some((dl, ms)) if Instant::now() >= dl => Err(StoreError::Timeout(ms)),
        _ => Ok(()),
    }
}

fn audit(op: &str, collection: &str, id: &DocumentId) {
    log::info!(target: AUDIT_TARGET, "{}", serde_json::json!({"op": op, "collection": collection, "doc_id": id.to_string()}));
}

/// Cheaply clonable handle; clones share the same collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<CollectionName, MemCollection>>>,
}

struct Scan {
    plan: ExplainPlan,
    examined: u64,
    docs: Vec<BsonDocument>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one document, assigning an ObjectId `_id` if it has none.
    pub fn insert(&self, collection: &str, data: BsonDocument) -> DocumentId {
        let doc = Document::new(data);
        let id = self.collections.write().entry(collection.to_string()).or_default().insert(doc);
        audit("insert", collection, &id);
        id
    }

    pub fn insert_many(&self, collection: &str, docs: impl IntoIterator<Item = BsonDocument>) -> Vec<DocumentId> {
        docs.into_iter().map(|d| self.insert(collection, d)).collect()
    }

    /// Insert every object of a JSON array.
    ///
    /// # Errors
    /// Returns [`DbError::Json`] for invalid JSON and [`DbError::InvalidSpec`] when the text is
    /// not an array of objects.
    pub fn load_json_array(&self, collection: &str, json: &str) -> Result<usize, DbError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let docs = crate::utils::json::json_value_to_bson_documents(&value)?;
        let n = docs.len();
        self.insert_many(collection, docs);
        log::debug!("loaded {n} documents into '{collection}'");
        Ok(n)
    }

    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, |c| c.docs.len())
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Snapshot of a collection in natural order.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<BsonDocument> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.docs.values().map(|d| d.data.clone()).collect())
            .unwrap_or_default()
    }

    // Shared find path: filter, sort, skip, limit, then projection.
    fn scan(&self, collection: &str, filter: &BsonDocument, options: &FindOptions) -> Result<Scan, StoreError> {
        let filter = Filter::parse(filter)?;
        let projection = options.projection.as_ref().map(Projection::parse).transpose()?;
        if let Some(sort) = &options.sort
            && sort.len() > MAX_SORT_FIELDS
        {
            return Err(StoreError::Malformed(format!("sort exceeds {MAX_SORT_FIELDS} fields")));
        }
        let deadline = deadline(options.timeout_ms);

        let cols = self.collections.read();
        let Some(col) = cols.get(collection) else {
            return Ok(Scan { plan: ExplainPlan::CollectionScan, examined: 0, docs: Vec::new() });
        };
        let (plan, candidates) = col.plan(&filter);
        let examined = usize_to_u64(candidates.len());
        let mut docs = Vec::new();
        for seq in candidates {
            check_deadline(deadline)?;
            if let Some(d) = col.docs.get(&seq)
                && filter.matches(&d.data)
            {
                docs.push(d.data.clone());
            }
        }
        drop(cols);

        if let Some(sort) = &options.sort {
            docs.sort_by(|a, b| compare_docs(a, b, sort));
        }
        let skip = options.skip.and_then(u64_to_usize).unwrap_or(0);
        let limit = options.limit.map_or(usize::MAX, |l| u64_to_usize(l).unwrap_or(usize::MAX));
        let mut docs: Vec<BsonDocument> = docs.into_iter().skip(skip).take(limit).collect();
        if let Some(p) = projection {
            for d in &mut docs {
                *d = p.apply(d);
            }
        }
        Ok(Scan { plan, examined, docs })
    }
}

impl DocumentStore for MemoryStore {
    fn find(
        &self,
        collection: &str,
        filter: &BsonDocument,
        options: &FindOptions,
    ) -> Result<Vec<BsonDocument>, StoreError> {
        Ok(self.scan(collection, filter, options)?.docs)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &BsonDocument,
        update: &BsonDocument,
        timeout_ms: Option<u64>,
    ) -> Result<UpdateReport, StoreError> {
        let filter = Filter::parse(filter)?;
        let update = UpdateDoc::parse(update)?;
        let mut cols = self.collections.write();
        let Some(col) = cols.get_mut(collection) else {
            return Ok(UpdateReport::default());
        };
        let Some(seq) = col.first_match(&filter, deadline(timeout_ms))? else {
            return Ok(UpdateReport::default());
        };
        let Some(current) = col.docs.get(&seq) else {
            return Ok(UpdateReport::default());
        };
        // Applied to a copy so a failing operator leaves the stored document untouched.
        let mut next = current.data.clone();
        if !update.apply(&mut next)? {
            return Ok(UpdateReport { matched: 1, modified: 0 });
        }
        let old = current.data.clone();
        let id = current.id;
        col.indexes.remove_all(&old, seq);
        col.indexes.insert_all(&next, seq);
        if let Some(doc) = col.docs.get_mut(&seq) {
            doc.update(next);
        }
        drop(cols);
        audit("update", collection, &id);
        Ok(UpdateReport { matched: 1, modified: 1 })
    }

    fn delete_one(
        &self,
        collection: &str,
        filter: &BsonDocument,
        timeout_ms: Option<u64>,
    ) -> Result<DeleteReport, StoreError> {
        let filter = Filter::parse(filter)?;
        let mut cols = self.collections.write();
        let Some(col) = cols.get_mut(collection) else {
            return Ok(DeleteReport::default());
        };
        let Some(seq) = col.first_match(&filter, deadline(timeout_ms))? else {
            return Ok(DeleteReport::default());
        };
        let Some(doc) = col.docs.remove(&seq) else {
            return Ok(DeleteReport::default());
        };
        col.indexes.remove_all(&doc.data, seq);
        drop(cols);
        audit("delete", collection, &doc.id);
        Ok(DeleteReport { deleted: 1 })
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[BsonDocument],
        timeout_ms: Option<u64>,
    ) -> Result<Vec<BsonDocument>, StoreError> {
        if pipeline.is_empty() {
            return Err(StoreError::Malformed("pipeline has no stages".into()));
        }
        let docs = self.documents(collection);
        aggregate::run_pipeline(docs, pipeline, deadline(timeout_ms))
    }

    fn create_index(&self, collection: &str, name: &str, keys: &IndexKeys) -> Result<IndexAck, StoreError> {
        if keys.0.is_empty() {
            return Err(StoreError::Malformed("index needs at least one key".into()));
        }
        if name.is_empty() {
            return Err(StoreError::Malformed("index name is empty".into()));
        }
        let mut cols = self.collections.write();
        let MemCollection { docs, indexes, .. } = cols.entry(collection.to_string()).or_default();
        let built = indexes.ensure(name, keys, docs.iter().map(|(seq, d)| (*seq, &d.data)))?;
        let stats = indexes.get(name).map(|i| i.stats).unwrap_or_default();
        drop(cols);
        if built {
            log::info!(
                "created index '{name}' on '{collection}' with keys {keys} ({} keys, {} entries, {} ms)",
                stats.keys,
                stats.entries,
                stats.build_time_ms
            );
        } else {
            log::debug!("index '{name}' on '{collection}' already exists");
        }
        Ok(IndexAck { name: name.to_string(), keys: keys.clone() })
    }

    fn explain_find(
        &self,
        collection: &str,
        filter: &BsonDocument,
        options: &FindOptions,
    ) -> Result<ExplainReport, StoreError> {
        let scan = self.scan(collection, filter, options)?;
        Ok(ExplainReport { plan: scan.plan, docs_examined: scan.examined, returned: usize_to_u64(scan.docs.len()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SortSpec;
    use bson::{Bson, doc};

    fn store() -> MemoryStore {
        let s = MemoryStore::new();
        s.insert_many(
            "books",
            [
                doc! {"title": "Zero to One", "author": "Peter Thiel", "price": 20, "published_year": 2014},
                doc! {"title": "Deep Work", "author": "Cal Newport", "price": 18.5, "published_year": 2016},
                doc! {"title": "Good to Great", "author": "Jim Collins", "price": 20, "published_year": 2001},
            ],
        );
        s
    }

    #[test]
    fn find_sort_is_stable_and_paginates() {
        let s = store();
        let opts = FindOptions {
            sort: Some(vec![SortSpec::asc("price")]),
            projection: Some(doc! {"_id": 0, "title": 1}),
            ..FindOptions::default()
        };
        let docs = s.find("books", &doc! {}, &opts).unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d.get_str("title").unwrap()).collect();
        assert_eq!(titles, ["Deep Work", "Zero to One", "Good to Great"]);

        let page = FindOptions { skip: Some(1), limit: Some(1), ..opts.clone() };
        assert_eq!(s.find("books", &doc! {}, &page).unwrap(), vec![doc! {"title": "Zero to One"}]);
        let none = FindOptions { limit: Some(0), ..opts };
        assert!(s.find("books", &doc! {}, &none).unwrap().is_empty());
    }

    #[test]
    fn update_touches_only_first_match() {
        let s = store();
        let r = s.update_one("books", &doc! {"price": 20}, &doc! {"$set": {"price": 22}}, None).unwrap();
        assert_eq!(r, UpdateReport { matched: 1, modified: 1 });
        let docs = s.documents("books");
        assert_eq!(docs[0].get_i32("price").unwrap(), 22);
        assert_eq!(docs[2].get_i32("price").unwrap(), 20);

        let same = s.update_one("books", &doc! {"title": "Deep Work"}, &doc! {"$set": {"price": 18.5}}, None).unwrap();
        assert_eq!(same, UpdateReport { matched: 1, modified: 0 });
        let miss = s.update_one("books", &doc! {"title": "Nope"}, &doc! {"$set": {"price": 1}}, None).unwrap();
        assert_eq!(miss, UpdateReport::default());
    }

    #[test]
    fn failed_update_leaves_document_intact() {
        let s = store();
        let err = s.update_one("books", &doc! {"title": "Deep Work"}, &doc! {"$set": {"price": 1}, "$inc": {"title": 1}}, None);
        assert!(matches!(err, Err(StoreError::Malformed(_))));
        assert_eq!(s.documents("books")[1].get_f64("price").unwrap(), 18.5);
    }

    #[test]
    fn delete_one_and_missing_collection() {
        let s = store();
        assert_eq!(s.delete_one("books", &doc! {"price": 20}, None).unwrap().deleted, 1);
        assert_eq!(s.len("books"), 2);
        assert_eq!(s.delete_one("books", &doc! {"title": "Nope"}, None).unwrap().deleted, 0);
        assert_eq!(s.delete_one("magazines", &doc! {}, None).unwrap().deleted, 0);
        assert!(s.find("magazines", &doc! {}, &FindOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn index_narrows_explain_and_survives_writes() {
        let s = store();
        let keys = IndexKeys::new(vec![SortSpec::asc("title")]);
        let ack = s.create_index("books", "title_1", &keys).unwrap();
        assert_eq!(ack, s.create_index("books", "title_1", &keys).unwrap());

        let report = s.explain_find("books", &doc! {"title": "Deep Work"}, &FindOptions::default()).unwrap();
        assert_eq!(report.plan, ExplainPlan::IndexScan { index: "title_1".into() });
        assert_eq!((report.docs_examined, report.returned), (1, 1));

        s.update_one("books", &doc! {"title": "Deep Work"}, &doc! {"$set": {"title": "Deep Work 2"}}, None).unwrap();
        assert!(s.find("books", &doc! {"title": "Deep Work"}, &FindOptions::default()).unwrap().is_empty());
        assert_eq!(s.find("books", &doc! {"title": "Deep Work 2"}, &FindOptions::default()).unwrap().len(), 1);

        let scan = s.explain_find("books", &doc! {"price": 20}, &FindOptions::default()).unwrap();
        assert_eq!(scan.plan, ExplainPlan::CollectionScan);
        assert_eq!((scan.docs_examined, scan.returned), (3, 2));
    }

    #[test]
    fn index_does_not_change_find_results() {
        let s = MemoryStore::new();
        s.insert_many(
            "books",
            [
                doc! {"title": "A", "price": Bson::Decimal128("20".parse().unwrap()), "isbn": 9_007_199_254_740_993_i64},
                doc! {"title": "B", "price": 20.0, "isbn": 9_007_199_254_740_992_i64},
                doc! {"title": "C", "price": 21, "isbn": 42_i64},
            ],
        );
        let filters = [
            doc! {"price": 20},
            doc! {"isbn": 9_007_199_254_740_992_i64},
            doc! {"isbn": {"$gt": 9_007_199_254_740_992_i64}},
        ];
        let run = |f: &BsonDocument| s.find("books", f, &FindOptions::default()).unwrap();
        let before: Vec<_> = filters.iter().map(run).collect();
        assert_eq!(before.iter().map(Vec::len).collect::<Vec<_>>(), [2, 1, 1]);

        s.create_index("books", "price_1", &IndexKeys::new(vec![SortSpec::asc("price")])).unwrap();
        s.create_index("books", "isbn_1", &IndexKeys::new(vec![SortSpec::asc("isbn")])).unwrap();
        let after: Vec<_> = filters.iter().map(run).collect();
        assert_eq!(before, after);

        // The decimal document is the first match in natural order.
        s.delete_one("books", &doc! {"price": 20}, None).unwrap();
        assert_eq!(s.documents("books")[0].get_str("title").unwrap(), "B");
    }

    #[test]
    fn zero_timeout_expires_find_and_aggregate() {
        let s = store();
        let opts = FindOptions { timeout_ms: Some(0), ..FindOptions::default() };
        assert_eq!(s.find("books", &doc! {}, &opts), Err(StoreError::Timeout(0)));
        assert_eq!(s.aggregate("books", &[doc! {"$match": {}}], Some(0)), Err(StoreError::Timeout(0)));
        assert_eq!(s.delete_one("books", &doc! {}, Some(0)), Err(StoreError::Timeout(0)));
        assert_eq!(s.len("books"), 3);
        // An empty collection has nothing to examine.
        assert!(s.find("magazines", &doc! {}, &opts).unwrap().is_empty());
    }

    #[test]
    fn load_json_array_inserts_objects() {
        let s = MemoryStore::new();
        let n = s.load_json_array("books", r#"[{"title": "A"}, {"title": "B"}]"#).unwrap();
        assert_eq!(n, 2);
        assert_eq!(s.len("books"), 2);
        assert!(s.load_json_array("books", "{").is_err());
    }
}

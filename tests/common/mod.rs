#![allow(dead_code)]

use bson::{Document as BsonDocument, doc};
use shelfquery::catalog::books;
use shelfquery::{
    DeleteReport, DocumentStore, ExplainReport, FindOptions, IndexAck, IndexKeys, MemoryStore,
    QueryRunner, StoreError, UpdateReport,
};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn book_docs() -> Vec<BsonDocument> {
    vec![
        doc! {"title": "Zero to One", "author": "Peter Thiel", "genre": "Business", "published_year": 2014, "price": 20, "in_stock": true},
        doc! {"title": "Deep Work", "author": "Cal Newport", "genre": "Productivity", "published_year": 2016, "price": 18.5, "in_stock": true},
        doc! {"title": "Good to Great", "author": "Jim Collins", "genre": "Business", "published_year": 2001, "price": 30, "in_stock": false},
        doc! {"title": "So Good They Can't Ignore You", "author": "Cal Newport", "genre": "Career", "published_year": 2012, "price": 15, "in_stock": true},
        doc! {"title": "Atomic Habits", "author": "James Clear", "genre": "Self-Help", "published_year": 2018, "price": 16, "in_stock": true},
        doc! {"title": "Digital Minimalism", "author": "Cal Newport", "genre": "Productivity", "published_year": 2019, "price": 17, "in_stock": false},
        doc! {"title": "The Lean Startup", "author": "Eric Ries", "genre": "Startups", "published_year": 2011, "price": 22, "in_stock": true},
        doc! {"title": "Thinking, Fast and Slow", "author": "Daniel Kahneman", "genre": "Psychology", "published_year": 2011, "price": 18, "in_stock": true},
        doc! {"title": "The Pragmatic Programmer", "author": "Andrew Hunt", "genre": "Technology", "published_year": 1999, "price": 42, "in_stock": true},
        doc! {"title": "Sapiens", "author": "Yuval Noah Harari", "genre": "History", "published_year": 2014, "price": 24, "in_stock": false},
    ]
}

pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_many("books", book_docs());
    store
}

pub fn books_runner() -> QueryRunner<MemoryStore> {
    QueryRunner::new(seeded_store(), books::builtin().unwrap().into_shared())
}

pub fn titles(docs: &[BsonDocument]) -> Vec<&str> {
    docs.iter().map(|d| d.get_str("title").unwrap()).collect()
}

/// Counts every call that reaches the wrapped store.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    pub inner: S,
    calls: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl<S: DocumentStore> DocumentStore for CountingStore<S> {
    fn find(&self, c: &str, f: &BsonDocument, o: &FindOptions) -> Result<Vec<BsonDocument>, StoreError> {
        self.hit();
        self.inner.find(c, f, o)
    }

    fn update_one(&self, c: &str, f: &BsonDocument, u: &BsonDocument, t: Option<u64>) -> Result<UpdateReport, StoreError> {
        self.hit();
        self.inner.update_one(c, f, u, t)
    }

    fn delete_one(&self, c: &str, f: &BsonDocument, t: Option<u64>) -> Result<DeleteReport, StoreError> {
        self.hit();
        self.inner.delete_one(c, f, t)
    }

    fn aggregate(&self, c: &str, p: &[BsonDocument], t: Option<u64>) -> Result<Vec<BsonDocument>, StoreError> {
        self.hit();
        self.inner.aggregate(c, p, t)
    }

    fn create_index(&self, c: &str, n: &str, k: &IndexKeys) -> Result<IndexAck, StoreError> {
        self.hit();
        self.inner.create_index(c, n, k)
    }

    fn explain_find(&self, c: &str, f: &BsonDocument, o: &FindOptions) -> Result<ExplainReport, StoreError> {
        self.hit();
        self.inner.explain_find(c, f, o)
    }
}

/// Store whose every operation fails with the configured error.
#[derive(Debug, Clone)]
pub struct FailingStore(pub StoreError);

impl DocumentStore for FailingStore {
    fn find(&self, _: &str, _: &BsonDocument, _: &FindOptions) -> Result<Vec<BsonDocument>, StoreError> {
        Err(self.0.clone())
    }

    fn update_one(&self, _: &str, _: &BsonDocument, _: &BsonDocument, _: Option<u64>) -> Result<UpdateReport, StoreError> {
        Err(self.0.clone())
    }

    fn delete_one(&self, _: &str, _: &BsonDocument, _: Option<u64>) -> Result<DeleteReport, StoreError> {
        Err(self.0.clone())
    }

    fn aggregate(&self, _: &str, _: &[BsonDocument], _: Option<u64>) -> Result<Vec<BsonDocument>, StoreError> {
        Err(self.0.clone())
    }

    fn create_index(&self, _: &str, _: &str, _: &IndexKeys) -> Result<IndexAck, StoreError> {
        Err(self.0.clone())
    }

    fn explain_find(&self, _: &str, _: &BsonDocument, _: &FindOptions) -> Result<ExplainReport, StoreError> {
        Err(self.0.clone())
    }
}

/// Store that records the timeout it was handed.
#[derive(Debug, Default)]
pub struct TimeoutProbe {
    pub seen: parking_lot::Mutex<Vec<Option<u64>>>,
}

impl DocumentStore for TimeoutProbe {
    fn find(&self, _: &str, _: &BsonDocument, o: &FindOptions) -> Result<Vec<BsonDocument>, StoreError> {
        self.seen.lock().push(o.timeout_ms);
        Ok(Vec::new())
    }

    fn update_one(&self, _: &str, _: &BsonDocument, _: &BsonDocument, t: Option<u64>) -> Result<UpdateReport, StoreError> {
        self.seen.lock().push(t);
        Ok(UpdateReport::default())
    }

    fn delete_one(&self, _: &str, _: &BsonDocument, t: Option<u64>) -> Result<DeleteReport, StoreError> {
        self.seen.lock().push(t);
        Ok(DeleteReport::default())
    }

    fn aggregate(&self, _: &str, _: &[BsonDocument], t: Option<u64>) -> Result<Vec<BsonDocument>, StoreError> {
        self.seen.lock().push(t);
        Ok(Vec::new())
    }

    fn create_index(&self, _: &str, n: &str, k: &IndexKeys) -> Result<IndexAck, StoreError> {
        Ok(IndexAck { name: n.to_string(), keys: k.clone() })
    }

    fn explain_find(&self, _: &str, _: &BsonDocument, o: &FindOptions) -> Result<ExplainReport, StoreError> {
        self.seen.lock().push(o.timeout_ms);
        Err(StoreError::Unsupported("explain".into()))
    }
}

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub type CollectionName = String;

/// A wrapper around `bson::oid::ObjectId`, stored in each record's `_id` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub ObjectId);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(ObjectId::new())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

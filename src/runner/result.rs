use bson::Document as BsonDocument;

use crate::store::{DeleteReport, IndexAck, UpdateReport};
use crate::utils::num::usize_to_u64;

/// Outcome of one executed query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Find and Aggregate, in the order the store returned them.
    Documents(Vec<BsonDocument>),
    Updated(UpdateReport),
    Deleted(DeleteReport),
    IndexCreated(IndexAck),
}

impl QueryResult {
    #[must_use]
    pub fn documents(&self) -> Option<&[BsonDocument]> {
        match self {
            Self::Documents(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_documents(self) -> Option<Vec<BsonDocument>> {
        match self {
            Self::Documents(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub const fn updated(&self) -> Option<UpdateReport> {
        match self {
            Self::Updated(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub const fn deleted(&self) -> Option<DeleteReport> {
        match self {
            Self::Deleted(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub const fn index(&self) -> Option<&IndexAck> {
        match self {
            Self::IndexCreated(a) => Some(a),
            _ => None,
        }
    }

    /// Documents returned, documents modified or deleted, or 1 for an index acknowledgment.
    #[must_use]
    pub fn result_count(&self) -> u64 {
        match self {
            Self::Documents(d) => usize_to_u64(d.len()),
            Self::Updated(r) => r.modified,
            Self::Deleted(r) => r.deleted,
            Self::IndexCreated(_) => 1,
        }
    }
}

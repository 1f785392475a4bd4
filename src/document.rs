use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};

/// A stored record: the BSON body plus the id mirrored in its `_id` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
}

impl Document {
    /// Wraps `data`, reusing an ObjectId `_id` when present and assigning a fresh one otherwise.
    #[must_use]
    pub fn new(mut data: BsonDocument) -> Self {
        let id = match data.get("_id") {
            Some(Bson::ObjectId(oid)) => DocumentId(*oid),
            _ => {
                let id = DocumentId::new();
                data.insert("_id", id.0);
                id
            }
        };
        Self { id, data }
    }

    /// Replaces the body while keeping the record's identity.
    pub fn update(&mut self, mut new_data: BsonDocument) {
        new_data.insert("_id", self.id.0);
        self.data = new_data;
    }
}

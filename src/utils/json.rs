use crate::errors::DbError;

/// Convert a `serde_json::Value` that must be an object into a `bson::Document`.
///
/// # Errors
/// Returns `DbError::InvalidSpec` when the value is not an object or cannot be represented as BSON.
pub fn json_value_to_bson_document(val: &serde_json::Value) -> Result<bson::Document, DbError> {
    let obj = val
        .as_object()
        .ok_or_else(|| DbError::InvalidSpec(format!("expected JSON object, found {val}")))?;
    bson::Document::try_from(obj.clone()).map_err(|e| DbError::InvalidSpec(e.to_string()))
}

/// Convert a JSON array of objects into a list of `bson::Document`s.
///
/// # Errors
/// Returns `DbError::InvalidSpec` when the value is not an array of objects.
pub fn json_value_to_bson_documents(val: &serde_json::Value) -> Result<Vec<bson::Document>, DbError> {
    let arr = val
        .as_array()
        .ok_or_else(|| DbError::InvalidSpec(format!("expected JSON array, found {val}")))?;
    arr.iter().map(json_value_to_bson_document).collect()
}

/// Parse a JSON string into a `bson::Document`. The JSON must be a top-level object.
///
/// # Errors
/// Returns an error on malformed JSON or a non-object top level.
pub fn parse_json_to_bson_document(json: &str) -> Result<bson::Document, DbError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    json_value_to_bson_document(&val)
}

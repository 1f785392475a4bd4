use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use std::fmt;

// Range operators whose operands must be orderable values.
pub(crate) const RANGE_OPERATORS: [&str; 4] = ["$gt", "$gte", "$lt", "$lte"];
// Aggregation string operators whose operands must already be strings.
pub(crate) const STRING_OPERATORS: [&str; 3] = ["$substr", "$substrCP", "$concat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Find,
    UpdateOne,
    DeleteOne,
    Aggregate,
    CreateIndex,
}

impl QueryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::UpdateOne => "update_one",
            Self::DeleteOne => "delete_one",
            Self::Aggregate => "aggregate",
            Self::CreateIndex => "create_index",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    /// Mongo-style direction: `1` ascending, `-1` descending.
    #[must_use]
    pub const fn from_direction(d: i64) -> Option<Self> {
        match d {
            1 => Some(Self::Asc),
            -1 => Some(Self::Desc),
            _ => None,
        }
    }

    #[must_use]
    pub const fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Ordered key specification of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexKeys(pub Vec<SortSpec>);

impl IndexKeys {
    #[must_use]
    pub fn new(keys: Vec<SortSpec>) -> Self {
        Self(keys)
    }

    /// Mongo naming convention: `author_1_published_year_1`.
    #[must_use]
    pub fn default_name(&self) -> String {
        self.0
            .iter()
            .map(|k| format!("{}_{}", k.field, k.order.direction()))
            .collect::<Vec<_>>()
            .join("_")
    }

    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        let mut d = BsonDocument::new();
        for k in &self.0 {
            d.insert(k.field.clone(), k.order.direction());
        }
        d
    }

    #[must_use]
    pub fn leading_field(&self) -> Option<&str> {
        self.0.first().map(|k| k.field.as_str())
    }
}

impl fmt::Display for IndexKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

/// Expected type of a placeholder value, or the declared stored type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Double,
    Number,
    Bool,
    DateTime,
    Document,
    Array,
    Any,
}

/// Declared stored type of a collection field.
pub type FieldType = ParamType;

impl ParamType {
    #[must_use]
    pub const fn accepts(self, v: &Bson) -> bool {
        match self {
            Self::String => matches!(v, Bson::String(_)),
            Self::Int => matches!(v, Bson::Int32(_) | Bson::Int64(_)),
            Self::Double => matches!(v, Bson::Double(_)),
            Self::Number => is_numeric(v),
            Self::Bool => matches!(v, Bson::Boolean(_)),
            Self::DateTime => matches!(v, Bson::DateTime(_)),
            Self::Document => matches!(v, Bson::Document(_)),
            Self::Array => matches!(v, Bson::Array(_)),
            Self::Any => true,
        }
    }

    /// Whether a value of this type can ever satisfy a range comparison.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        matches!(self, Self::Int | Self::Double | Self::Number | Self::DateTime | Self::Any)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::Document => "document",
            Self::Array => "array",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub const fn is_numeric(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

/// Short BSON type name used in error messages.
#[must_use]
pub const fn bson_type_name(v: &Bson) -> &'static str {
    match v {
        Bson::Null => "null",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Double(_) => "double",
        Bson::Decimal128(_) => "decimal128",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "datetime",
        _ => "other",
    }
}

/// A declared placeholder: `"$<name>"` in the template is replaced by a value of type `ty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

/// Shape-specific body of a query spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Filter document for Find and DeleteOne.
    Filter(BsonDocument),
    Update { filter: BsonDocument, update: BsonDocument },
    Pipeline(Vec<BsonDocument>),
    IndexKeys(IndexKeys),
}

use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::value::{compare_same_kind, get_path, values_equal};
use crate::store::StoreError;

pub(crate) const MAX_IN_SET: usize = 1000;
const MAX_FILTER_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub(crate) enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, re: regex::Regex },
}

impl Filter {
    /// Parse a Mongo-style filter document.
    pub(crate) fn parse(doc: &BsonDocument) -> Result<Self, StoreError> {
        parse_doc(doc, 0)
    }

    /// Equality value required on `path` by this filter, if the filter pins one at the top level.
    pub(crate) fn eq_value(&self, path: &str) -> Option<&Bson> {
        match self {
            Self::Cmp { path: p, op: CmpOp::Eq, value } if p == path => Some(value),
            Self::And(fs) => fs.iter().find_map(|f| f.eq_value(path)),
            _ => None,
        }
    }

    pub(crate) fn matches(&self, doc: &BsonDocument) -> bool {
        match self {
            Self::True => true,
            Self::And(fs) => fs.iter().all(|f| f.matches(doc)),
            Self::Or(fs) => fs.iter().any(|f| f.matches(doc)),
            Self::Not(f) => !f.matches(doc),
            Self::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
            Self::In { path, values } => {
                get_path(doc, path).is_some_and(|v| values.iter().any(|x| element_eq(v, x)))
            }
            Self::Cmp { path, op, value } => get_path(doc, path).is_some_and(|v| cmp_matches(v, *op, value)),
            #[cfg(feature = "regex")]
            Self::Regex { path, re } => {
                matches!(get_path(doc, path), Some(Bson::String(s)) if re.is_match(s))
            }
        }
    }
}

// Arrays match a scalar when any element matches.
fn element_eq(v: &Bson, target: &Bson) -> bool {
    match v {
        Bson::Array(items) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|i| values_equal(i, target))
        }
        _ => values_equal(v, target),
    }
}

fn cmp_matches(v: &Bson, op: CmpOp, target: &Bson) -> bool {
    if op == CmpOp::Eq {
        return element_eq(v, target);
    }
    if let Bson::Array(items) = v {
        return items.iter().any(|i| cmp_matches(i, op, target));
    }
    match compare_same_kind(v, target) {
        Some(ord) => match op {
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Gte => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Lte => ord != Ordering::Greater,
            CmpOp::Eq => ord == Ordering::Equal,
        },
        None => false,
    }
}

fn parse_doc(doc: &BsonDocument, depth: usize) -> Result<Filter, StoreError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::Malformed("filter nested too deeply".into()));
    }
    let mut parts = Vec::with_capacity(doc.len());
    for (k, v) in doc {
        match k.as_str() {
            "$and" | "$or" | "$nor" => {
                let subs = match v {
                    Bson::Array(items) if !items.is_empty() => items
                        .iter()
                        .map(|i| match i {
                            Bson::Document(d) => parse_doc(d, depth + 1),
                            other => Err(StoreError::Malformed(format!("{k} expects documents, got {other}"))),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(StoreError::Malformed(format!("{k} expects a non-empty array"))),
                };
                parts.push(match k.as_str() {
                    "$and" => Filter::And(subs),
                    "$or" => Filter::Or(subs),
                    _ => Filter::Not(Box::new(Filter::Or(subs))),
                });
            }
            op if op.starts_with('$') => {
                return Err(StoreError::Unsupported(format!("top-level operator {op}")));
            }
            path => match v {
                Bson::Document(ops) if ops.keys().next().is_some_and(|f| f.starts_with('$')) => {
                    parts.push(parse_ops(path, ops, depth + 1)?);
                }
                literal => parts.push(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: literal.clone() }),
            },
        }
    }
    Ok(match parts.len() {
        0 => Filter::True,
        1 => parts.remove(0),
        _ => Filter::And(parts),
    })
}

fn parse_ops(path: &str, ops: &BsonDocument, depth: usize) -> Result<Filter, StoreError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::Malformed("filter nested too deeply".into()));
    }
    let cmp = |op: CmpOp, v: &Bson| Filter::Cmp { path: path.to_string(), op, value: v.clone() };
    let mut parts = Vec::with_capacity(ops.len());
    for (op, v) in ops {
        let f = match op.as_str() {
            "$eq" => cmp(CmpOp::Eq, v),
            "$ne" => Filter::Not(Box::new(cmp(CmpOp::Eq, v))),
            "$gt" => cmp(CmpOp::Gt, v),
            "$gte" => cmp(CmpOp::Gte, v),
            "$lt" => cmp(CmpOp::Lt, v),
            "$lte" => cmp(CmpOp::Lte, v),
            "$in" | "$nin" => {
                let Bson::Array(values) = v else {
                    return Err(StoreError::Malformed(format!("{op} on '{path}' expects an array")));
                };
                if values.len() > MAX_IN_SET {
                    return Err(StoreError::Malformed(format!("{op} set larger than {MAX_IN_SET}")));
                }
                let f = Filter::In { path: path.to_string(), values: values.clone() };
                if op == "$in" { f } else { Filter::Not(Box::new(f)) }
            }
            "$exists" => match v {
                Bson::Boolean(b) => Filter::Exists { path: path.to_string(), exists: *b },
                other => {
                    return Err(StoreError::Malformed(format!("$exists expects a bool, got {other}")));
                }
            },
            "$not" => match v {
                Bson::Document(inner) => Filter::Not(Box::new(parse_ops(path, inner, depth + 1)?)),
                _ => return Err(StoreError::Malformed("$not expects an operator document".into())),
            },
            #[cfg(feature = "regex")]
            "$regex" => {
                let Bson::String(pattern) = v else {
                    return Err(StoreError::Malformed("$regex expects a string".into()));
                };
                if pattern.len() > 512 {
                    return Err(StoreError::Malformed("$regex pattern too long".into()));
                }
                let case_insensitive =
                    matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
                let re = regex::RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                Filter::Regex { path: path.to_string(), re }
            }
            #[cfg(feature = "regex")]
            "$options" => continue,
            other => return Err(StoreError::Unsupported(format!("filter operator {other}"))),
        };
        parts.push(f);
    }
    Ok(if parts.len() == 1 { parts.remove(0) } else { Filter::And(parts) })
}

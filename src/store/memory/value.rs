use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use crate::spec::{Order, SortSpec, is_numeric};
use crate::utils::num::bson_to_f64;

pub(crate) const MAX_PATH_DEPTH: usize = 32;

/// Resolve a dotted path through nested documents.
pub(crate) fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').peekable();
    let mut depth = 0usize;
    while let Some(part) = parts.next() {
        depth += 1;
        if depth > MAX_PATH_DEPTH {
            return None;
        }
        let v = cur.get(part)?;
        if parts.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}

// Integer pairs compare exactly; anything involving a double or decimal goes through `f64`.
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    let int = |v: &Bson| match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    };
    if let (Some(x), Some(y)) = (int(a), int(b)) {
        return Some(x.cmp(&y));
    }
    let (x, y) = (bson_to_f64(a)?, bson_to_f64(b)?);
    Some(x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y)))
}

/// Equality with numeric values compared by magnitude (`5 == 5.0`).
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_numeric(a) && is_numeric(b) {
        return compare_numbers(a, b) == Some(Ordering::Equal);
    }
    a == b
}

/// Ordering for range operators; `None` when the values are not of comparable kinds.
pub(crate) fn compare_same_kind(a: &Bson, b: &Bson) -> Option<Ordering> {
    if is_numeric(a) && is_numeric(b) {
        return compare_numbers(a, b);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: values of different kinds order by kind rank.
pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    compare_same_kind(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

// Mongo's cross-type sort order: null, numbers, strings, documents, arrays, binary, oid, bool, date.
fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

/// Compare two documents by a multi-key sort. Missing fields sort before present ones.
pub(crate) fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn nested_paths() {
        let d = doc! {"a": {"b": {"c": 1}}, "x": 2};
        assert_eq!(get_path(&d, "a.b.c"), Some(&Bson::Int32(1)));
        assert_eq!(get_path(&d, "x"), Some(&Bson::Int32(2)));
        assert_eq!(get_path(&d, "x.y"), None);
        assert_eq!(get_path(&d, ""), None);
    }

    #[test]
    fn numeric_equality_across_widths() {
        assert!(values_equal(&Bson::Int32(20), &Bson::Double(20.0)));
        assert!(!values_equal(&Bson::Int32(20), &Bson::String("20".into())));
    }

    #[test]
    fn large_int64_values_compare_exactly() {
        let (lo, hi) = (Bson::Int64(9_007_199_254_740_992), Bson::Int64(9_007_199_254_740_993));
        assert!(!values_equal(&lo, &hi));
        assert_eq!(compare_same_kind(&hi, &lo), Some(Ordering::Greater));
        assert_eq!(compare_same_kind(&Bson::Int32(7), &Bson::Int64(7)), Some(Ordering::Equal));
        assert!(values_equal(&Bson::Double(0.0), &Bson::Double(-0.0)));
        let d: Bson = Bson::Decimal128("20".parse().unwrap());
        assert!(values_equal(&d, &Bson::Int32(20)));
    }

    #[test]
    fn range_needs_same_kind() {
        assert_eq!(compare_same_kind(&Bson::Int32(2016), &Bson::Int64(2015)), Some(Ordering::Greater));
        assert_eq!(compare_same_kind(&Bson::String("2016".into()), &Bson::Int32(2015)), None);
    }

    #[test]
    fn sort_missing_first_and_desc() {
        let a = doc! {"price": 10};
        let b = doc! {"price": 20};
        let none = doc! {};
        let asc = [SortSpec::asc("price")];
        assert_eq!(compare_docs(&a, &b, &asc), Ordering::Less);
        assert_eq!(compare_docs(&none, &a, &asc), Ordering::Less);
        assert_eq!(compare_docs(&a, &b, &[SortSpec::desc("price")]), Ordering::Greater);
    }
}

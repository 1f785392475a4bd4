use bson::{Bson, Document as BsonDocument};

use super::value::MAX_PATH_DEPTH;
use crate::spec::is_numeric;
use crate::store::StoreError;
use crate::utils::num::bson_to_f64;

const MAX_UPDATE_FIELDS: usize = 128;

/// Parsed `$set` / `$inc` / `$unset` update document.
#[derive(Debug, Default, Clone)]
pub(crate) struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

impl UpdateDoc {
    pub(crate) fn parse(doc: &BsonDocument) -> Result<Self, StoreError> {
        let mut out = Self::default();
        for (op, v) in doc {
            let Bson::Document(fields) = v else {
                return Err(StoreError::Malformed(format!("{op} expects a document")));
            };
            if fields.len() > MAX_UPDATE_FIELDS {
                return Err(StoreError::Malformed(format!("{op} touches too many fields")));
            }
            for (k, val) in fields {
                check_path(k)?;
                match op.as_str() {
                    "$set" => out.set.push((k.clone(), val.clone())),
                    "$inc" => {
                        if !is_numeric(val) {
                            return Err(StoreError::Malformed(format!("$inc on '{k}' requires a number")));
                        }
                        out.inc.push((k.clone(), val.clone()));
                    }
                    "$unset" => out.unset.push(k.clone()),
                    other => return Err(StoreError::Unsupported(format!("update operator {other}"))),
                }
            }
        }
        if out.set.is_empty() && out.inc.is_empty() && out.unset.is_empty() {
            return Err(StoreError::Malformed("update document has no operations".into()));
        }
        Ok(out)
    }

    /// Apply to `doc`, returning whether anything changed.
    pub(crate) fn apply(&self, doc: &mut BsonDocument) -> Result<bool, StoreError> {
        let mut changed = false;
        for (k, v) in &self.set {
            changed |= set_path(doc, k, v.clone())?;
        }
        for (k, by) in &self.inc {
            let next = match get_path_owned(doc, k) {
                None => by.clone(),
                Some(cur) if is_numeric(&cur) => add_numbers(&cur, by),
                Some(cur) => {
                    return Err(StoreError::Malformed(format!("cannot $inc non-numeric field '{k}' ({cur})")));
                }
            };
            changed |= set_path(doc, k, next)?;
        }
        for k in &self.unset {
            changed |= unset_path(doc, k);
        }
        Ok(changed)
    }
}

fn check_path(path: &str) -> Result<(), StoreError> {
    if path.is_empty() || path.split('.').any(str::is_empty) || path.split('.').count() > MAX_PATH_DEPTH {
        return Err(StoreError::Malformed(format!("invalid field path '{path}'")));
    }
    if path == "_id" || path.starts_with("_id.") {
        return Err(StoreError::Malformed("the _id field is immutable".into()));
    }
    Ok(())
}

// Integer + integer stays integral (widening on overflow); anything else becomes a double.
fn add_numbers(a: &Bson, b: &Bson) -> Bson {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => {
            x.checked_add(*y).map_or_else(|| Bson::Int64(i64::from(*x) + i64::from(*y)), Bson::Int32)
        }
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let x = crate::utils::num::bson_to_i64(a).unwrap_or(0);
            let y = crate::utils::num::bson_to_i64(b).unwrap_or(0);
            x.checked_add(y).map_or_else(
                || Bson::Double(bson_to_f64(a).unwrap_or(0.0) + bson_to_f64(b).unwrap_or(0.0)),
                Bson::Int64,
            )
        }
        _ => Bson::Double(bson_to_f64(a).unwrap_or(0.0) + bson_to_f64(b).unwrap_or(0.0)),
    }
}

fn traverse_to_parent<'a>(root: &'a mut BsonDocument, path: &str) -> Result<(&'a mut BsonDocument, String), StoreError> {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return Ok((cur, seg.to_string()));
        }
        if !cur.contains_key(seg) {
            cur.insert(seg.to_string(), BsonDocument::new());
        }
        cur = match cur.get_mut(seg) {
            Some(Bson::Document(d)) => d,
            _ => {
                return Err(StoreError::Malformed(format!("cannot create field inside non-document '{seg}' of '{path}'")));
            }
        };
    }
    Err(StoreError::Malformed(format!("invalid field path '{path}'")))
}

fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> Result<bool, StoreError> {
    let (parent, last) = traverse_to_parent(root, path)?;
    let old = parent.insert(last, value.clone());
    Ok(old.as_ref() != Some(&value))
}

fn get_path_owned(root: &BsonDocument, path: &str) -> Option<Bson> {
    super::value::get_path(root, path).cloned()
}

fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.remove(seg).is_some();
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_inc_unset() {
        let mut d = doc! {"title": "Deep Work", "price": 18, "stock": {"count": 1}, "old": true};
        let upd = UpdateDoc::parse(&doc! {
            "$set": {"price": 20.0, "meta.edition": 2},
            "$inc": {"stock.count": 2},
            "$unset": {"old": ""},
        })
        .unwrap();
        assert!(upd.apply(&mut d).unwrap());
        assert_eq!(d.get_f64("price").unwrap(), 20.0);
        assert_eq!(d.get_document("meta").unwrap().get_i32("edition").unwrap(), 2);
        assert_eq!(d.get_document("stock").unwrap().get_i32("count").unwrap(), 3);
        assert!(!d.contains_key("old"));
    }

    #[test]
    fn unchanged_value_reports_no_change() {
        let mut d = doc! {"price": 20.0};
        let upd = UpdateDoc::parse(&doc! {"$set": {"price": 20.0}}).unwrap();
        assert!(!upd.apply(&mut d).unwrap());
    }

    #[test]
    fn inc_widens_on_overflow() {
        assert_eq!(add_numbers(&Bson::Int32(i32::MAX), &Bson::Int32(1)), Bson::Int64(i64::from(i32::MAX) + 1));
        assert_eq!(add_numbers(&Bson::Int32(1), &Bson::Double(0.5)), Bson::Double(1.5));
    }

    #[test]
    fn rejects_bad_updates() {
        assert!(matches!(UpdateDoc::parse(&doc! {"$push": {"a": 1}}), Err(StoreError::Unsupported(_))));
        assert!(matches!(UpdateDoc::parse(&doc! {"$inc": {"a": "x"}}), Err(StoreError::Malformed(_))));
        assert!(matches!(UpdateDoc::parse(&doc! {"$set": {"_id": 1}}), Err(StoreError::Malformed(_))));
        assert!(matches!(UpdateDoc::parse(&doc! {"$set": 1}), Err(StoreError::Malformed(_))));
        let mut d = doc! {"title": 5};
        let upd = UpdateDoc::parse(&doc! {"$set": {"title.sub": 1}}).unwrap();
        assert!(upd.apply(&mut d).is_err());
    }
}

use bson::{Bson, Document as BsonDocument};

use super::value::get_path;
use crate::spec::bson_type_name;
use crate::store::StoreError;
use crate::utils::num::bson_to_i64;

/// Evaluate an aggregation expression against one document.
pub(crate) fn eval(expr: &Bson, doc: &BsonDocument) -> Result<Bson, StoreError> {
    match expr {
        Bson::String(s) if s == "$$ROOT" => Ok(Bson::Document(doc.clone())),
        Bson::String(s) if s.starts_with("$$") => Err(StoreError::Unsupported(format!("variable {s}"))),
        Bson::String(s) if s.starts_with('$') => Ok(get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null)),
        Bson::Document(d) => match d.iter().next() {
            Some((op, args)) if op.starts_with('$') => {
                if d.len() != 1 {
                    return Err(StoreError::Malformed(format!("expression {op} must be the only key")));
                }
                eval_operator(op, args, doc)
            }
            _ => {
                let mut out = BsonDocument::new();
                for (k, v) in d {
                    out.insert(k.clone(), eval(v, doc)?);
                }
                Ok(Bson::Document(out))
            }
        },
        Bson::Array(items) => Ok(Bson::Array(items.iter().map(|i| eval(i, doc)).collect::<Result<_, _>>()?)),
        literal => Ok(literal.clone()),
    }
}

fn args_of<'a>(op: &str, args: &'a Bson, n: Option<usize>) -> Result<Vec<&'a Bson>, StoreError> {
    let list: Vec<&Bson> = match args {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    if let Some(n) = n
        && list.len() != n
    {
        return Err(StoreError::Malformed(format!("{op} expects {n} arguments, got {}", list.len())));
    }
    Ok(list)
}

fn eval_operator(op: &str, args: &Bson, doc: &BsonDocument) -> Result<Bson, StoreError> {
    match op {
        "$literal" => Ok(args.clone()),
        "$toString" => {
            let list = args_of(op, args, Some(1))?;
            to_string(&eval(list[0], doc)?)
        }
        "$concat" => {
            let mut out = String::new();
            for a in args_of(op, args, None)? {
                match eval(a, doc)? {
                    Bson::String(s) => out.push_str(&s),
                    Bson::Null => return Ok(Bson::Null),
                    other => {
                        return Err(StoreError::Malformed(format!(
                            "$concat only supports strings, got {}",
                            bson_type_name(&other)
                        )));
                    }
                }
            }
            Ok(Bson::String(out))
        }
        "$substr" | "$substrCP" => {
            let list = args_of(op, args, Some(3))?;
            let s = match eval(list[0], doc)? {
                Bson::String(s) => s,
                Bson::Null => String::new(),
                other => {
                    return Err(StoreError::Malformed(format!(
                        "{op} requires a string operand, got {}; convert it with $toString",
                        bson_type_name(&other)
                    )));
                }
            };
            let start = bson_to_i64(&eval(list[1], doc)?)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| StoreError::Malformed(format!("{op} start must be a non-negative integer")))?;
            let len = bson_to_i64(&eval(list[2], doc)?)
                .ok_or_else(|| StoreError::Malformed(format!("{op} length must be an integer")))?;
            let rest = s.chars().skip(start);
            let out: String = match usize::try_from(len) {
                Ok(n) => rest.take(n).collect(),
                Err(_) => rest.collect(),
            };
            Ok(Bson::String(out))
        }
        other => Err(StoreError::Unsupported(format!("expression operator {other}"))),
    }
}

fn to_string(v: &Bson) -> Result<Bson, StoreError> {
    Ok(match v {
        Bson::Null => Bson::Null,
        Bson::String(s) => Bson::String(s.clone()),
        Bson::Int32(i) => Bson::String(i.to_string()),
        Bson::Int64(i) => Bson::String(i.to_string()),
        Bson::Double(f) => Bson::String(f.to_string()),
        Bson::Decimal128(d) => Bson::String(d.to_string()),
        Bson::Boolean(b) => Bson::String(b.to_string()),
        Bson::ObjectId(o) => Bson::String(o.to_hex()),
        Bson::DateTime(dt) => Bson::String(
            dt.try_to_rfc3339_string().map_err(|e| StoreError::Malformed(e.to_string()))?,
        ),
        other => {
            return Err(StoreError::Malformed(format!("$toString cannot convert {}", bson_type_name(other))));
        }
    })
}

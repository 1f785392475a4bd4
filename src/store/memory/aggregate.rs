use bson::{Bson, Document as BsonDocument};
use std::time::Instant;

use super::expr::eval;
use super::filter::Filter;
use super::value::{compare_bson, compare_docs, values_equal};
use crate::spec::{Order, SortSpec, is_numeric};
use crate::store::StoreError;
use crate::utils::num::{bson_to_f64, bson_to_i64, i64_to_u64, u64_to_usize};

/// Run `stages` in the order given over `docs`.
pub(crate) fn run_pipeline(
    mut docs: Vec<BsonDocument>,
    stages: &[BsonDocument],
    deadline: Option<(Instant, u64)>,
) -> Result<Vec<BsonDocument>, StoreError> {
    for stage in stages {
        if let Some((dl, ms)) = deadline
            && Instant::now() >= dl
        {
            return Err(StoreError::Timeout(ms));
        }
        let mut it = stage.iter();
        let (Some((name, arg)), None) = (it.next(), it.next()) else {
            return Err(StoreError::Malformed(format!("pipeline stage must have exactly one key: {stage}")));
        };
        docs = match name.as_str() {
            "$match" => {
                let filter = Filter::parse(as_doc(name, arg)?)?;
                docs.into_iter().filter(|d| filter.matches(d)).collect()
            }
            "$group" => group(docs, as_doc(name, arg)?)?,
            "$sort" => {
                let keys = sort_keys(as_doc(name, arg)?)?;
                docs.sort_by(|a, b| compare_docs(a, b, &keys));
                docs
            }
            "$limit" => {
                let n = count_arg(name, arg)?;
                if n == 0 {
                    return Err(StoreError::Malformed("$limit must be positive".into()));
                }
                docs.into_iter().take(n).collect()
            }
            "$skip" => {
                let n = count_arg(name, arg)?;
                docs.into_iter().skip(n).collect()
            }
            "$project" => project(docs, as_doc(name, arg)?)?,
            "$count" => {
                let Bson::String(field) = arg else {
                    return Err(StoreError::Malformed("$count expects a field name".into()));
                };
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = BsonDocument::new();
                    out.insert(field.clone(), count_value(docs.len()));
                    vec![out]
                }
            }
            other => return Err(StoreError::Unsupported(format!("pipeline stage {other}"))),
        };
    }
    Ok(docs)
}

fn as_doc<'a>(stage: &str, arg: &'a Bson) -> Result<&'a BsonDocument, StoreError> {
    match arg {
        Bson::Document(d) => Ok(d),
        other => Err(StoreError::Malformed(format!("{stage} expects a document, got {other}"))),
    }
}

fn count_arg(stage: &str, arg: &Bson) -> Result<usize, StoreError> {
    bson_to_i64(arg)
        .and_then(i64_to_u64)
        .and_then(u64_to_usize)
        .ok_or_else(|| StoreError::Malformed(format!("{stage} expects a non-negative integer, got {arg}")))
}

fn count_value(n: usize) -> Bson {
    i32::try_from(n).map_or_else(|_| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)), Bson::Int32)
}

pub(crate) fn sort_keys(spec: &BsonDocument) -> Result<Vec<SortSpec>, StoreError> {
    if spec.is_empty() {
        return Err(StoreError::Malformed("$sort needs at least one key".into()));
    }
    spec.iter()
        .map(|(field, dir)| {
            let order = bson_to_i64(dir)
                .and_then(Order::from_direction)
                .ok_or_else(|| StoreError::Malformed(format!("sort direction for '{field}' must be 1 or -1")))?;
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

#[derive(Debug)]
enum Acc {
    Sum { int: i64, float: f64, any_float: bool, overflow: bool },
    Avg { total: f64, n: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
}

impl Acc {
    fn new(op: &str) -> Result<Self, StoreError> {
        Ok(match op {
            "$sum" | "$count" => Self::Sum { int: 0, float: 0.0, any_float: false, overflow: false },
            "$avg" => Self::Avg { total: 0.0, n: 0 },
            "$min" => Self::Min(None),
            "$max" => Self::Max(None),
            "$first" => Self::First(None),
            "$last" => Self::Last(Bson::Null),
            "$push" => Self::Push(Vec::new()),
            other => return Err(StoreError::Unsupported(format!("accumulator {other}"))),
        })
    }

    fn feed(&mut self, v: Bson) {
        // $min and $max ignore nulls and missing fields.
        if matches!(self, Self::Min(_) | Self::Max(_)) && matches!(v, Bson::Null) {
            return;
        }
        match self {
            Self::Sum { int, float, any_float, overflow } => {
                if !is_numeric(&v) {
                    return;
                }
                *float += bson_to_f64(&v).unwrap_or(0.0);
                match (&v, int.checked_add(bson_to_i64(&v).unwrap_or(0))) {
                    (Bson::Int32(_) | Bson::Int64(_), Some(next)) => *int = next,
                    (Bson::Int32(_) | Bson::Int64(_), None) => *overflow = true,
                    _ => *any_float = true,
                }
            }
            Self::Avg { total, n } => {
                if let Some(f) = bson_to_f64(&v) {
                    *total += f;
                    *n += 1;
                }
            }
            Self::Min(cur) => {
                if cur.as_ref().is_none_or(|c| compare_bson(&v, c).is_lt()) {
                    *cur = Some(v);
                }
            }
            Self::Max(cur) => {
                if cur.as_ref().is_none_or(|c| compare_bson(&v, c).is_gt()) {
                    *cur = Some(v);
                }
            }
            Self::First(cur) => {
                if cur.is_none() {
                    *cur = Some(v);
                }
            }
            Self::Last(cur) => *cur = v,
            Self::Push(items) => items.push(v),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum { int, float, any_float, overflow } => {
                if any_float || overflow {
                    Bson::Double(float)
                } else {
                    i32::try_from(int).map_or(Bson::Int64(int), Bson::Int32)
                }
            }
            Self::Avg { total, n } => {
                if n == 0 { Bson::Null } else { Bson::Double(total / n as f64) }
            }
            Self::Min(v) | Self::Max(v) | Self::First(v) => v.unwrap_or(Bson::Null),
            Self::Last(v) => v,
            Self::Push(items) => Bson::Array(items),
        }
    }
}

struct GroupSpec<'a> {
    id: &'a Bson,
    fields: Vec<(&'a str, &'a str, &'a Bson)>,
}

fn parse_group(spec: &BsonDocument) -> Result<GroupSpec<'_>, StoreError> {
    let id = spec
        .get("_id")
        .ok_or_else(|| StoreError::Malformed("$group requires an _id expression".into()))?;
    let mut fields = Vec::new();
    for (name, acc) in spec {
        if name == "_id" {
            continue;
        }
        let Bson::Document(acc_doc) = acc else {
            return Err(StoreError::Malformed(format!("$group field '{name}' must be an accumulator")));
        };
        let mut it = acc_doc.iter();
        let (Some((op, expr)), None) = (it.next(), it.next()) else {
            return Err(StoreError::Malformed(format!("$group field '{name}' must have one accumulator")));
        };
        Acc::new(op)?;
        fields.push((name.as_str(), op.as_str(), expr));
    }
    Ok(GroupSpec { id, fields })
}

// Groups are emitted in the order their key was first seen.
fn group(docs: Vec<BsonDocument>, spec: &BsonDocument) -> Result<Vec<BsonDocument>, StoreError> {
    let g = parse_group(spec)?;
    let mut groups: Vec<(Bson, Vec<Acc>)> = Vec::new();
    for d in &docs {
        let key = eval(g.id, d)?;
        let idx = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(i) => i,
            None => {
                let accs = g.fields.iter().map(|(_, op, _)| Acc::new(op)).collect::<Result<Vec<_>, _>>()?;
                groups.push((key, accs));
                groups.len() - 1
            }
        };
        for ((_, op, expr), acc) in g.fields.iter().zip(groups[idx].1.iter_mut()) {
            let v = if *op == "$count" { Bson::Int32(1) } else { eval(expr, d)? };
            acc.feed(v);
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            for ((name, _, _), acc) in g.fields.iter().zip(accs) {
                out.insert(*name, acc.finish());
            }
            out
        })
        .collect())
}

fn project(docs: Vec<BsonDocument>, spec: &BsonDocument) -> Result<Vec<BsonDocument>, StoreError> {
    let mut keep_id = true;
    let mut included: Vec<&str> = Vec::new();
    let mut excluded: Vec<&str> = Vec::new();
    let mut computed: Vec<(&str, &Bson)> = Vec::new();
    for (k, v) in spec {
        if k.contains('.') || k.starts_with('$') {
            return Err(StoreError::Unsupported(format!("$project path '{k}'")));
        }
        let flag = match v {
            Bson::Boolean(b) => Some(*b),
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Some(bson_to_f64(v).unwrap_or(0.0) != 0.0),
            _ => None,
        };
        match (k.as_str(), flag) {
            ("_id", Some(on)) => keep_id = on,
            (_, Some(true)) => included.push(k),
            (_, Some(false)) => excluded.push(k),
            (_, None) => computed.push((k, v)),
        }
    }
    if !excluded.is_empty() && (!included.is_empty() || !computed.is_empty()) {
        return Err(StoreError::Malformed("$project cannot mix exclusion with inclusion".into()));
    }
    docs.into_iter()
        .map(|d| {
            if !excluded.is_empty() || (included.is_empty() && computed.is_empty()) {
                let mut out = d;
                for f in &excluded {
                    out.remove(*f);
                }
                if !keep_id {
                    out.remove("_id");
                }
                return Ok(out);
            }
            let mut out = BsonDocument::new();
            if keep_id && let Some(id) = d.get("_id") {
                out.insert("_id", id.clone());
            }
            for f in &included {
                if let Some(v) = d.get(*f) {
                    out.insert(*f, v.clone());
                }
            }
            for (f, e) in &computed {
                out.insert(*f, eval(e, &d)?);
            }
            Ok(out)
        })
        .collect()
}

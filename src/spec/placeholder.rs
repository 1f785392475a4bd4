use bson::{Bson, Document as BsonDocument};

use super::types::{Placeholder, Template};

/// Strips the leading `$` of a candidate placeholder or field reference.
pub(crate) fn dollar_name(s: &str) -> Option<&str> {
    s.strip_prefix('$').filter(|n| !n.is_empty() && !n.starts_with('$'))
}

/// Resolves a string value to the declared placeholder it names, if any.
pub(crate) fn lookup<'p>(s: &str, declared: &'p [Placeholder]) -> Option<&'p Placeholder> {
    let name = dollar_name(s)?;
    declared.iter().find(|p| p.name == name)
}

/// Calls `f(enclosing_key, value)` for every string value nested in `v`.
/// Array elements report the key that holds the array.
pub(crate) fn visit_strings<'a, F>(v: &'a Bson, key: Option<&'a str>, f: &mut F)
where
    F: FnMut(Option<&'a str>, &'a str),
{
    match v {
        Bson::String(s) => f(key, s),
        Bson::Document(d) => visit_document_strings(d, f),
        Bson::Array(items) => {
            for item in items {
                visit_strings(item, key, f);
            }
        }
        _ => {}
    }
}

pub(crate) fn visit_document_strings<'a, F>(d: &'a BsonDocument, f: &mut F)
where
    F: FnMut(Option<&'a str>, &'a str),
{
    for (k, v) in d {
        visit_strings(v, Some(k.as_str()), f);
    }
}

/// Every document of a template that may carry placeholders.
pub(crate) fn template_documents(t: &Template) -> Vec<&BsonDocument> {
    match t {
        Template::Filter(f) => vec![f],
        Template::Update { filter, update } => vec![filter, update],
        Template::Pipeline(stages) => stages.iter().collect(),
        Template::IndexKeys(_) => Vec::new(),
    }
}

/// Direct `"$field"` operands of any operator in `ops`, at any depth.
pub(crate) fn operator_field_refs<'a>(d: &'a BsonDocument, ops: &[&str], out: &mut Vec<(&'a str, &'a str)>) {
    for (k, v) in d {
        if ops.contains(&k.as_str()) {
            let operands: Vec<&Bson> = match v {
                Bson::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for op in operands {
                if let Bson::String(s) = op
                    && let Some(field) = dollar_name(s)
                {
                    out.push((k.as_str(), field));
                }
            }
        }
        match v {
            Bson::Document(sub) => operator_field_refs(sub, ops, out),
            Bson::Array(items) => {
                for item in items {
                    if let Bson::Document(sub) = item {
                        operator_field_refs(sub, ops, out);
                    }
                }
            }
            _ => {}
        }
    }
}

//! Update operators and projections applied to stored documents.

use bson::{Bson, Document, oid::ObjectId};

use docmodel_core::{
    condition::is_operator_map,
    error::{DocModelError, DocModelResult},
    path,
    schema::ID_PATH,
};

use crate::evaluator::{Comparable, matches};

/// Applies `changes` to `document`.
///
/// A document without operators replaces every field except `_id`. `$setOnInsert`
/// only takes effect when `inserting` is set.
pub(crate) fn apply(document: &mut Document, changes: &Document, inserting: bool) -> DocModelResult<()> {
    if !changes.keys().any(|key| key.starts_with('$')) {
        let id = document.remove(ID_PATH);
        *document = changes.clone();
        if let Some(id) = id {
            document.insert(ID_PATH, id);
        }
        return Ok(());
    }

    for (op, fields) in changes {
        let Bson::Document(fields) = fields else {
            return Err(DocModelError::Query(format!("{op} expects a document of fields")));
        };

        for (field, value) in fields {
            match op.as_str() {
                "$set" => path::set(document, field, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        path::set(document, field, value.clone())?;
                    }
                },
                "$unset" => unset(document, field),
                "$inc" => increment(document, field, value)?,
                "$push" => push(document, field, value, false)?,
                "$addToSet" => push(document, field, value, true)?,
                "$pull" => pull(document, field, value)?,
                "$pop" => pop(document, field, value)?,
                other => return Err(DocModelError::Query(format!("unsupported update operator {other}"))),
            }
        }
    }

    Ok(())
}

/// Builds the document inserted by an upsert that matched nothing.
///
/// Plain equality conditions seed the document before `changes` are applied.
pub(crate) fn upserted(conditions: &Document, changes: &Document) -> DocModelResult<Document> {
    let mut document = Document::new();

    for (field, value) in conditions {
        if field.starts_with('$') {
            continue;
        }
        if let Bson::Document(inner) = value
            && is_operator_map(inner)
        {
            continue;
        }
        path::set(&mut document, field, value.clone())?;
    }

    apply(&mut document, changes, true)?;

    if !document.contains_key(ID_PATH) {
        document.insert(ID_PATH, ObjectId::new());
    }

    Ok(document)
}

/// Applies a projection: `1` keeps a field, `0` drops it.
///
/// `_id` is kept by an inclusive projection unless it is excluded explicitly.
pub(crate) fn project(document: Document, fields: &Document) -> Document {
    let inclusive = fields
        .iter()
        .any(|(field, flag)| field != ID_PATH && truthy(flag));

    if !inclusive {
        let mut document = document;
        for (field, _) in fields {
            unset(&mut document, field);
        }
        return document;
    }

    let mut projected = Document::new();
    let keep_id = fields.get(ID_PATH).is_none_or(truthy);

    if keep_id && let Some(id) = document.get(ID_PATH) {
        projected.insert(ID_PATH, id.clone());
    }

    for (field, flag) in fields {
        if field == ID_PATH || !truthy(flag) {
            continue;
        }
        if let Some(value) = path::get(&document, field) {
            // Paths are read from a valid document, so writing them back cannot fail.
            let _ = path::set(&mut projected, field, value.clone());
        }
    }

    projected
}

fn truthy(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => true,
    }
}

fn unset(document: &mut Document, field: &str) {
    match field.rsplit_once(path::SEPARATOR) {
        Some((parent, key)) => {
            if let Some(Bson::Document(inner)) = path::get_mut(document, parent) {
                inner.remove(key);
            }
        },
        None => {
            document.remove(field);
        },
    }
}

fn increment(document: &mut Document, field: &str, by: &Bson) -> DocModelResult<()> {
    let current = path::get(document, field).cloned().unwrap_or(Bson::Int32(0));

    let sum = match (&current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => {
            return Err(DocModelError::Query(format!(
                "cannot $inc \"{field}\" holding {current} by {by}"
            )));
        },
    };

    path::set(document, field, sum)
}

fn push(document: &mut Document, field: &str, value: &Bson, unique: bool) -> DocModelResult<()> {
    let incoming = match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => return Err(DocModelError::Query("$each expects an array".to_string())),
        },
        single => vec![single.clone()],
    };

    let mut items = match path::get(document, field) {
        Some(Bson::Array(items)) => items.clone(),
        None | Some(Bson::Null) => Vec::new(),
        Some(other) => {
            return Err(DocModelError::Query(format!(
                "cannot push onto \"{field}\" holding {other}"
            )));
        },
    };

    for item in incoming {
        let present = items
            .iter()
            .any(|existing| Comparable::from(existing) == Comparable::from(&item));
        if unique && present {
            continue;
        }
        items.push(item);
    }

    path::set(document, field, Bson::Array(items))
}

fn pull(document: &mut Document, field: &str, value: &Bson) -> DocModelResult<()> {
    let Some(Bson::Array(items)) = path::get_mut(document, field) else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        let hit = match (value, &item) {
            (Bson::Document(condition), Bson::Document(inner)) if !is_operator_map(condition) => {
                matches(inner, condition)?
            },
            (Bson::Document(condition), _) if is_operator_map(condition) => {
                let mut probe = Document::new();
                probe.insert("v", item.clone());
                let mut wrapped = Document::new();
                wrapped.insert("v", condition.clone());
                matches(&probe, &wrapped)?
            },
            (operand, item) => Comparable::from(item) == Comparable::from(operand),
        };
        if !hit {
            kept.push(item);
        }
    }
    *items = kept;

    Ok(())
}

fn pop(document: &mut Document, field: &str, value: &Bson) -> DocModelResult<()> {
    if let Some(Bson::Array(items)) = path::get_mut(document, field) {
        let first = matches!(value, Bson::Int32(-1) | Bson::Int64(-1))
            || matches!(value, Bson::Double(n) if *n < 0.0);
        if first {
            if !items.is_empty() {
                items.remove(0);
            }
        } else {
            items.pop();
        }
    }

    Ok(())
}

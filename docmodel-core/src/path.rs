//! Dotted-path helpers over BSON documents.
//!
//! Paths use `.` as the segment separator (`contact.email`). Numeric segments index
//! into arrays when reading; writes only ever descend through embedded documents.

use bson::{Bson, Document};

use crate::error::{DocModelError, DocModelResult};

/// The path segment separator.
pub const SEPARATOR: char = '.';

/// Splits a dotted path into its segments.
pub fn split(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).collect()
}

/// Returns every proper ancestor prefix of `path`, nearest first.
///
/// `ancestors("a.b.c")` yields `["a.b", "a"]`.
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices(SEPARATOR)
        .map(|(index, _)| &path[..index])
        .rev()
        .collect()
}

/// Looks up the value stored at `path`.
pub fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    get_in(doc, &split(path))
}

fn get_in<'a>(doc: &'a Document, splits: &[&str]) -> Option<&'a Bson> {
    let (key, rest) = splits.split_first()?;
    let value = doc.get(*key)?;

    if rest.is_empty() {
        return Some(value);
    }

    match value {
        Bson::Document(inner) => get_in(inner, rest),
        Bson::Array(items) => {
            let index = rest[0].parse::<usize>().ok()?;
            match (items.get(index)?, rest.len()) {
                (item, 1) => Some(item),
                (Bson::Document(inner), _) => get_in(inner, &rest[1..]),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Looks up the value stored at `path` for in-place modification.
///
/// Only descends through embedded documents; never creates anything.
pub fn get_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let splits = split(path);
    let (last, parents) = splits.split_last()?;

    let mut current = doc;
    for segment in parents {
        current = match current.get_mut(*segment) {
            Some(Bson::Document(inner)) => inner,
            _ => return None,
        };
    }

    current.get_mut(*last)
}

/// Returns a mutable reference to the document that directly holds the last segment
/// of `path`, creating intermediate documents as needed.
///
/// Fails when an intermediate segment holds a non-document value.
pub fn parent_mut<'a>(doc: &'a mut Document, path: &str) -> DocModelResult<(&'a mut Document, String)> {
    let splits = split(path);
    let (last, parents) = splits
        .split_last()
        .ok_or_else(|| DocModelError::InvalidPath("empty path".to_string()))?;

    if last.is_empty() {
        return Err(DocModelError::InvalidPath(format!("empty segment in \"{path}\"")));
    }

    let mut current = doc;
    for segment in parents {
        if segment.is_empty() {
            return Err(DocModelError::InvalidPath(format!("empty segment in \"{path}\"")));
        }

        if !matches!(current.get(*segment), Some(Bson::Document(_))) {
            match current.get(*segment) {
                None | Some(Bson::Null) => {
                    current.insert(segment.to_string(), Document::new());
                }
                Some(_) => {
                    return Err(DocModelError::InvalidPath(format!(
                        "segment \"{segment}\" of \"{path}\" is not an embedded document"
                    )));
                }
            }
        }

        current = match current.get_mut(*segment) {
            Some(Bson::Document(inner)) => inner,
            _ => unreachable!("segment was just ensured to hold a document"),
        };
    }

    Ok((current, last.to_string()))
}

/// Writes `value` at `path`, creating intermediate documents as needed.
pub fn set(doc: &mut Document, path: &str, value: Bson) -> DocModelResult<()> {
    let (parent, key) = parent_mut(doc, path)?;
    parent.insert(key, value);

    Ok(())
}

/// Merges `incoming` into `target`.
///
/// When both sides of a key hold embedded documents they are merged recursively;
/// otherwise the incoming value replaces the existing one outright.
pub fn merge(target: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        let Bson::Document(inner) = value else {
            target.insert(key, value);
            continue;
        };

        if let Some(Bson::Document(existing)) = target.get_mut(&key) {
            merge(existing, inner);
            continue;
        }

        target.insert(key, Bson::Document(inner));
    }
}

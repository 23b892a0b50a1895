//! Condition evaluation for in-memory document filtering.
//!
//! Conditions use the same document form the query builder produces: plain values
//! match by equality, operator maps (`{ "$gte": 18 }`) apply each operator in turn,
//! and `$or`, `$and` and `$nor` combine sub-conditions. Dotted paths reach into
//! embedded documents and fan out across arrays of documents, so `comments.author`
//! matches when any comment has that author.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docmodel_core::{
    condition::is_operator_map,
    error::{DocModelError, DocModelResult},
    path,
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `Int32(2)` equals `Double(2.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl Comparable<'_> {
    // Cross-type ordering, lowest first.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// A total order for sorting: values of the same type compare naturally, values
    /// of different types by type rank.
    pub(crate) fn sort_order(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Whether `document` satisfies `conditions`.
///
/// # Errors
///
/// Returns [`DocModelError::Query`] for malformed operands or operators this
/// evaluator does not understand, and [`DocModelError::UnimplementedOperation`] for
/// `$where`, which needs a script engine.
pub(crate) fn matches(document: &Document, conditions: &Document) -> DocModelResult<bool> {
    for (key, condition) in conditions {
        let satisfied = match key.as_str() {
            "$or" => {
                let mut any = false;
                for branch in branches(key, condition)? {
                    if matches(document, branch)? {
                        any = true;
                        break;
                    }
                }
                any
            },
            "$and" => {
                let mut all = true;
                for branch in branches(key, condition)? {
                    if !matches(document, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            },
            "$nor" => {
                let mut none = true;
                for branch in branches(key, condition)? {
                    if matches(document, branch)? {
                        none = false;
                        break;
                    }
                }
                none
            },
            "$where" => return Err(DocModelError::UnimplementedOperation("$where".to_string())),
            other if other.starts_with('$') => {
                return Err(DocModelError::Query(format!("unsupported combinator {other}")));
            },
            field => field_matches(&lookup(document, field), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn branches<'a>(key: &str, condition: &'a Bson) -> DocModelResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(DocModelError::Query(format!("{key} expects an array of conditions")));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(branch) => Ok(branch),
            other => Err(DocModelError::Query(format!("{key} branch must be a document, got {other}"))),
        })
        .collect()
}

/// Collects every value reachable through `field`, fanning out across arrays.
pub(crate) fn lookup<'a>(document: &'a Document, field: &str) -> Vec<&'a Bson> {
    let mut found = Vec::new();
    collect(document, &path::split(field), &mut found);
    found
}

fn collect<'a>(document: &'a Document, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((key, rest)) = segments.split_first() else {
        return;
    };

    if let Some(value) = document.get(*key) {
        descend(value, rest, found);
    }
}

fn descend<'a>(value: &'a Bson, rest: &[&str], found: &mut Vec<&'a Bson>) {
    if rest.is_empty() {
        found.push(value);
        return;
    }

    match value {
        Bson::Document(inner) => collect(inner, rest, found),
        Bson::Array(items) => match rest[0].parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    descend(item, &rest[1..], found);
                }
            },
            Err(_) => {
                for item in items {
                    if let Bson::Document(inner) = item {
                        collect(inner, rest, found);
                    }
                }
            },
        },
        _ => {},
    }
}

// Values plus the elements of array values, which is what scalar operators test.
fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn field_matches(values: &[&Bson], condition: &Bson) -> DocModelResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_map(operators) => operators_match(values, operators),
        operand => equals_any(values, operand),
    }
}

fn operators_match(values: &[&Bson], operators: &Document) -> DocModelResult<bool> {
    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => equals_any(values, operand)?,
            "$ne" => !equals_any(values, operand)?,
            "$gt" => compare_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compare_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compare_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compare_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_any(values, array_operand(op, operand)?)?,
            "$nin" => !in_any(values, array_operand(op, operand)?)?,
            "$all" => {
                let wanted = array_operand(op, operand)?;
                let mut all = !wanted.is_empty();
                for item in wanted {
                    if !equals_any(values, item)? {
                        all = false;
                        break;
                    }
                }
                all
            },
            "$size" => {
                let size = number(op, operand)?;
                values.iter().any(|value| matches!(value, Bson::Array(items) if items.len() as f64 == size))
            },
            "$exists" => !values.is_empty() == truthy(operand),
            "$elemMatch" => elem_match(values, op, operand)?,
            "$mod" => modulo(values, operand)?,
            "$regex" => {
                let options = match operators.get("$options") {
                    Some(Bson::String(options)) => options.as_str(),
                    _ => "",
                };
                let regex = match operand {
                    Bson::String(pattern) => compile(pattern, options)?,
                    Bson::RegularExpression(regex) => compile(regex.pattern.as_str(), regex.options.as_str())?,
                    other => return Err(DocModelError::Query(format!("$regex expects a pattern, got {other}"))),
                };
                candidates(values)
                    .into_iter()
                    .any(|value| matches!(value, Bson::String(s) if regex.is_match(s)))
            },
            "$not" => match operand {
                Bson::Document(inner) => !operators_match(values, inner)?,
                other => !equals_any(values, other)?,
            },
            "$near" => {
                let center = point(op, operand)?;
                let limit = match operators.get("$maxDistance") {
                    Some(distance) => number("$maxDistance", distance)?,
                    None => f64::INFINITY,
                };
                values
                    .iter()
                    .filter_map(|value| coordinates(value))
                    .any(|[x, y]| (x - center[0]).hypot(y - center[1]) <= limit)
            },
            "$within" => within(values, operand)?,
            "$options" | "$maxDistance" => true,
            other => return Err(DocModelError::Query(format!("unsupported operator {other}"))),
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn equals(value: &Bson, operand: &Bson) -> DocModelResult<bool> {
    if let Bson::RegularExpression(regex) = operand {
        return Ok(match value {
            Bson::String(s) => compile(regex.pattern.as_str(), regex.options.as_str())?.is_match(s),
            _ => false,
        });
    }

    Ok(Comparable::from(value) == Comparable::from(operand))
}

fn equals_any(values: &[&Bson], operand: &Bson) -> DocModelResult<bool> {
    // A null operand also matches a missing field.
    if values.is_empty() {
        return Ok(matches!(operand, Bson::Null));
    }

    for value in candidates(values) {
        if equals(value, operand)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn in_any(values: &[&Bson], wanted: &[Bson]) -> DocModelResult<bool> {
    for item in wanted {
        if equals_any(values, item)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn compare_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);

    candidates(values)
        .into_iter()
        .filter_map(|value| Comparable::from(value).partial_cmp(&operand))
        .any(accept)
}

fn elem_match(values: &[&Bson], op: &str, operand: &Bson) -> DocModelResult<bool> {
    let Bson::Document(condition) = operand else {
        return Err(DocModelError::Query(format!("{op} expects a document, got {operand}")));
    };

    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };

        for item in items {
            let hit = match item {
                _ if is_operator_map(condition) => operators_match(&[item], condition)?,
                Bson::Document(inner) => matches(inner, condition)?,
                _ => false,
            };
            if hit {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn modulo(values: &[&Bson], operand: &Bson) -> DocModelResult<bool> {
    let (divisor, remainder) = match array_operand("$mod", operand)? {
        [divisor, remainder] => (number("$mod", divisor)? as i64, number("$mod", remainder)? as i64),
        _ => return Err(DocModelError::Query("$mod expects [divisor, remainder]".to_string())),
    };

    if divisor == 0 {
        return Err(DocModelError::Query("$mod divisor must not be zero".to_string()));
    }

    Ok(
        candidates(values)
            .into_iter()
            .filter_map(numeric)
            .any(|n| (n as i64) % divisor == remainder)
    )
}

fn within(values: &[&Bson], operand: &Bson) -> DocModelResult<bool> {
    let Bson::Document(shape) = operand else {
        return Err(DocModelError::Query(format!("$within expects a shape, got {operand}")));
    };

    let contains: Box<dyn Fn([f64; 2]) -> bool> = if let Some(corners) = shape.get("$box") {
        let [lower, upper] = match array_operand("$box", corners)? {
            [lower, upper] => [point("$box", lower)?, point("$box", upper)?],
            _ => return Err(DocModelError::Query("$box expects two corners".to_string())),
        };
        Box::new(move |[x, y]| x >= lower[0] && x <= upper[0] && y >= lower[1] && y <= upper[1])
    } else if let Some(circle) = shape.get("$center") {
        let (center, radius) = match array_operand("$center", circle)? {
            [center, radius] => (point("$center", center)?, number("$center", radius)?),
            _ => return Err(DocModelError::Query("$center expects [center, radius]".to_string())),
        };
        Box::new(move |[x, y]| (x - center[0]).hypot(y - center[1]) <= radius)
    } else {
        return Err(DocModelError::Query(format!("unsupported shape {shape}")));
    };

    Ok(values.iter().filter_map(|value| coordinates(value)).any(contains))
}

fn compile(pattern: &str, options: &str) -> DocModelResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| DocModelError::Query(format!("invalid regular expression {pattern:?}: {e}")))
}

fn array_operand<'a>(op: &str, operand: &'a Bson) -> DocModelResult<&'a [Bson]> {
    match operand {
        Bson::Array(items) => Ok(items),
        other => Err(DocModelError::Query(format!("{op} expects an array, got {other}"))),
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn number(op: &str, operand: &Bson) -> DocModelResult<f64> {
    numeric(operand).ok_or_else(|| DocModelError::Query(format!("{op} expects a number, got {operand}")))
}

fn point(op: &str, operand: &Bson) -> DocModelResult<[f64; 2]> {
    coordinates(operand).ok_or_else(|| DocModelError::Query(format!("{op} expects [x, y], got {operand}")))
}

fn coordinates(value: &Bson) -> Option<[f64; 2]> {
    match value {
        Bson::Array(items) if items.len() >= 2 => Some([numeric(&items[0])?, numeric(&items[1])?]),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => numeric(other).is_none_or(|n| n != 0.0),
    }
}

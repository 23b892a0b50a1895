//! Casting of query conditions and update documents against a schema.
//!
//! Condition values are cast with the same rules as document writes, so that a query
//! for `{ "_owner": "4e4f3a3b2c1d0e0f10111213" }` matches the stored `ObjectId`.
//! Operator maps are cast operand by operand: list operators cast each element,
//! `$exists` requires a boolean, `$elemMatch` recurses into embedded schemas, and
//! structural operators (`$size`, `$mod`, geo shapes) pass through untouched.
//! Paths the schema does not declare are left as given.

use bson::{Bson, Document};

use crate::{
    error::{DocModelError, DocModelResult},
    path,
    schema::{Schema, SchemaType},
};

/// Whether `doc` is a map of query operators (every key starts with `$`).
pub fn is_operator_map(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

/// Casts a condition document.
///
/// # Errors
///
/// Returns [`DocModelError::Query`] for an unsupported top-level combinator or a
/// malformed operand, and [`DocModelError::Cast`] when a value cannot be cast.
pub fn cast_conditions(schema: &Schema, conditions: Document) -> DocModelResult<Document> {
    let mut cast = Document::new();

    for (key, value) in conditions {
        let value = match key.as_str() {
            "$where" => match value {
                Bson::String(_) | Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => value,
                other => {
                    return Err(DocModelError::Query(format!(
                        "$where expects code, got {other}"
                    )));
                }
            },
            "$or" | "$and" | "$nor" => Bson::Array(cast_branches(schema, &key, value)?),
            combinator if combinator.starts_with('$') => {
                return Err(DocModelError::Query(format!(
                    "unsupported combinator \"{combinator}\""
                )));
            }
            path => cast_path(schema, path, value)?,
        };

        cast.insert(key, value);
    }

    Ok(cast)
}

fn cast_branches(schema: &Schema, combinator: &str, value: Bson) -> DocModelResult<Vec<Bson>> {
    let Bson::Array(branches) = value else {
        return Err(DocModelError::Query(format!("{combinator} expects an array")));
    };

    branches
        .into_iter()
        .map(|branch| match branch {
            Bson::Document(branch) => Ok(Bson::Document(cast_conditions(schema, branch)?)),
            other => Err(DocModelError::Query(format!(
                "{combinator} branch must be a document, got {other}"
            ))),
        })
        .collect()
}

/// Casts an update document.
///
/// A document without update operators is treated as the payload of a `$set`.
pub fn cast_update(schema: &Schema, changes: Document) -> DocModelResult<Document> {
    if !changes.keys().any(|key| key.starts_with('$')) {
        let mut wrapped = Document::new();
        wrapped.insert("$set", cast_fields(schema, changes)?);
        return Ok(wrapped);
    }

    let mut cast = Document::new();
    for (op, fields) in changes {
        let fields = match (op.as_str(), fields) {
            ("$set" | "$setOnInsert" | "$push" | "$addToSet", Bson::Document(fields)) => {
                Bson::Document(cast_fields(schema, fields)?)
            }
            (_, fields) => fields,
        };
        cast.insert(op, fields);
    }

    Ok(cast)
}

fn cast_fields(schema: &Schema, fields: Document) -> DocModelResult<Document> {
    fields
        .into_iter()
        .map(|(path, value)| {
            let value = cast_path(schema, &path, value)?;
            Ok((path, value))
        })
        .collect()
}

enum Resolved<'a> {
    Declared(&'a SchemaType),
    Embedded(&'a Schema, String),
    Unknown,
}

// Walks up to the nearest declared ancestor when the exact path is not declared.
fn resolve<'a>(schema: &'a Schema, full: &str) -> Resolved<'a> {
    if let Some(ty) = schema.path_type(full) {
        return Resolved::Declared(ty);
    }

    for ancestor in path::ancestors(full) {
        let Some(ty) = schema.path_type(ancestor) else {
            continue;
        };

        let rest = &full[ancestor.len() + 1..];
        let rest = match rest.split_once(path::SEPARATOR) {
            Some((index, inner)) if index.parse::<usize>().is_ok() => inner,
            _ if rest.parse::<usize>().is_ok() => {
                return Resolved::Declared(ty.element_type());
            }
            _ => rest,
        };

        return match ty.element_type() {
            SchemaType::Documents(embedded) => Resolved::Embedded(embedded, rest.to_string()),
            _ => Resolved::Unknown,
        };
    }

    Resolved::Unknown
}

fn cast_path(schema: &Schema, full: &str, value: Bson) -> DocModelResult<Bson> {
    match resolve(schema, full) {
        Resolved::Declared(ty) => cast_for_type(ty, full, value),
        Resolved::Embedded(embedded, rest) => cast_path(embedded, &rest, value),
        Resolved::Unknown => Ok(value),
    }
}

fn cast_for_type(ty: &SchemaType, full: &str, value: Bson) -> DocModelResult<Bson> {
    let operators = match value {
        Bson::Document(operators) if is_operator_map(&operators) => operators,
        other => return cast_operand(ty, full, other),
    };

    let mut cast = Document::new();
    for (op, operand) in operators {
        let operand = match op.as_str() {
            "$exists" => match operand {
                Bson::Boolean(_) => operand,
                other => {
                    return Err(DocModelError::Query(format!(
                        "$exists on \"{full}\" expects a boolean, got {other}"
                    )));
                }
            },
            "$ne" if operand == Bson::Null => operand,
            "$in" | "$nin" | "$all" => match operand {
                Bson::Array(items) => Bson::Array(
                    items
                        .into_iter()
                        .map(|item| cast_operand(ty.element_type(), full, item))
                        .collect::<DocModelResult<_>>()?,
                ),
                other => cast_operand(ty.element_type(), full, other)?,
            },
            "$elemMatch" => match (ty.element_type(), operand) {
                (SchemaType::Documents(embedded), Bson::Document(conditions)) => {
                    Bson::Document(cast_conditions(embedded, conditions)?)
                }
                (_, operand) => operand,
            },
            "$not" => cast_for_type(ty, full, operand)?,
            "$size" | "$mod" | "$near" | "$nearSphere" | "$maxDistance" | "$within"
            | "$regex" | "$options" | "$type" => operand,
            _ => cast_operand(ty, full, operand)?,
        };
        cast.insert(op, operand);
    }

    Ok(Bson::Document(cast))
}

fn cast_operand(ty: &SchemaType, full: &str, value: Bson) -> DocModelResult<Bson> {
    if matches!(value, Bson::RegularExpression(_)) {
        return Ok(value);
    }

    let ty = if ty.is_array() && matches!(value, Bson::Array(_)) {
        ty
    } else {
        ty.element_type()
    };

    ty.cast(value).map_err(|err| err.at(full).into())
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;

    fn people() -> Schema {
        Schema::builder()
            .field("name", SchemaType::String)
            .field("age", SchemaType::Number)
            .array("tags", SchemaType::String)
            .documents("pets", |p| p
                .field("name", SchemaType::String)
                .field("born", SchemaType::Date))
            .property("_owner")
            .build()
            .unwrap()
    }

    #[test]
    fn casts_equality_values() {
        let owner = ObjectId::new();
        let cast = cast_conditions(&people(), doc! { "_owner": owner.to_hex(), "age": "30" }).unwrap();

        assert_eq!(cast, doc! { "_owner": owner, "age": 30.0 });
    }

    #[test]
    fn casts_operator_operands() {
        let cast = cast_conditions(
            &people(),
            doc! { "age": { "$gte": "18", "$in": ["1", 2] }, "name": { "$exists": true } },
        )
        .unwrap();

        assert_eq!(cast, doc! { "age": { "$gte": 18.0, "$in": [1.0, 2] }, "name": { "$exists": true } });
    }

    #[test]
    fn exists_requires_boolean() {
        let result = cast_conditions(&people(), doc! { "name": { "$exists": "yes" } });

        assert!(matches!(result, Err(DocModelError::Query(_))));
    }

    #[test]
    fn array_paths_use_element_type() {
        let cast = cast_conditions(&people(), doc! { "tags": 5, "tags.0": 6 }).unwrap();

        assert_eq!(cast, doc! { "tags": "5", "tags.0": "6" });
    }

    #[test]
    fn embedded_paths_resolve_through_document_arrays() {
        let cast = cast_conditions(
            &people(),
            doc! {
                "pets.born": "1970-01-02",
                "pets": { "$elemMatch": { "name": 7 } },
            },
        )
        .unwrap();

        assert_eq!(
            cast,
            doc! {
                "pets.born": bson::DateTime::from_millis(86_400_000),
                "pets": { "$elemMatch": { "name": "7" } },
            }
        );
    }

    #[test]
    fn or_branches_are_cast_and_unknown_combinators_rejected() {
        let cast = cast_conditions(&people(), doc! { "$or": [{ "age": "1" }, { "name": "x" }] }).unwrap();
        assert_eq!(cast, doc! { "$or": [{ "age": 1.0 }, { "name": "x" }] });

        assert!(matches!(
            cast_conditions(&people(), doc! { "$bogus": [] }),
            Err(DocModelError::Query(_))
        ));
    }

    #[test]
    fn where_accepts_only_code() {
        assert!(cast_conditions(&people(), doc! { "$where": "this.age > 1" }).is_ok());
        assert!(cast_conditions(&people(), doc! { "$where": 1 }).is_err());
    }

    #[test]
    fn undeclared_paths_and_structural_operators_pass_through() {
        let conditions = doc! { "extra": "1", "tags": { "$size": 2 }, "age": { "$ne": null } };

        assert_eq!(cast_conditions(&people(), conditions.clone()).unwrap(), conditions);
    }

    #[test]
    fn bad_identifier_is_a_cast_error() {
        assert!(matches!(
            cast_conditions(&people(), doc! { "_owner": "nope" }),
            Err(DocModelError::Cast(_))
        ));
    }

    #[test]
    fn plain_update_is_wrapped_in_set() {
        let cast = cast_update(&people(), doc! { "age": "4" }).unwrap();
        assert_eq!(cast, doc! { "$set": { "age": 4.0 } });

        let cast = cast_update(&people(), doc! { "$inc": { "age": 1 }, "$push": { "tags": 3 } }).unwrap();
        assert_eq!(cast, doc! { "$inc": { "age": 1 }, "$push": { "tags": "3" } });
    }
}

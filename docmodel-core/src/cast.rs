//! Casting rules applied when values are written to a schema path.
//!
//! Each rule is a total function from a raw value to the declared type. `null` passes
//! through every rule. Dates are cast leniently (an unparsable string becomes `null`)
//! while identifiers are strict (a malformed hex string is a [`CastError`]).

use bson::{Bson, DateTime, oid::ObjectId};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::{error::CastError, schema::SchemaType};

impl SchemaType {
    /// The human-readable name of this type, used in cast errors.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaType::String => "String",
            SchemaType::Number => "Number",
            SchemaType::Boolean => "Boolean",
            SchemaType::ObjectId => "ObjectId",
            SchemaType::Date => "Date",
            SchemaType::Mixed => "Mixed",
            SchemaType::Array(_) => "Array",
            SchemaType::Documents(_) => "DocumentArray",
        }
    }

    /// The type used for a single element of this type.
    ///
    /// For arrays this is the element type; every other type is its own element type.
    pub fn element_type(&self) -> &SchemaType {
        match self {
            SchemaType::Array(inner) => inner,
            other => other,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, SchemaType::Array(_))
    }

    /// Casts `value` to this type.
    ///
    /// # Errors
    ///
    /// Returns a [`CastError`] when the value cannot be represented as this type.
    /// Array casting never fails: elements that fail to cast are dropped.
    pub fn cast(&self, value: Bson) -> Result<Bson, CastError> {
        if matches!(value, Bson::Null) {
            return Ok(value);
        }

        match self {
            SchemaType::String => cast_string(value),
            SchemaType::Number => Ok(cast_number(value)),
            SchemaType::Boolean => cast_boolean(value),
            SchemaType::ObjectId => cast_object_id(value),
            SchemaType::Date => cast_date(value),
            SchemaType::Mixed => Ok(value),
            SchemaType::Array(element) => Ok(cast_array(element, value)),
            SchemaType::Documents(schema) => match value {
                Bson::Document(doc) => Ok(Bson::Document(schema.cast_document(doc)?)),
                other => Err(CastError::new("EmbeddedDocument", &other)),
            },
        }
    }
}

fn cast_array(element: &SchemaType, value: Bson) -> Bson {
    let items = match value {
        Bson::Array(items) => items,
        single => vec![single],
    };

    Bson::Array(
        items
            .into_iter()
            .filter_map(|item| element.cast(item).ok())
            .collect(),
    )
}

fn cast_string(value: Bson) -> Result<Bson, CastError> {
    Ok(Bson::String(match value {
        Bson::String(_) => return Ok(value),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => n.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => Utc
            .timestamp_millis_opt(dt.timestamp_millis())
            .single()
            .map(|parsed| parsed.to_rfc3339())
            .ok_or_else(|| CastError::new("String", &Bson::DateTime(dt)))?,
        Bson::Symbol(s) | Bson::JavaScriptCode(s) => s,
        other => return Err(CastError::new("String", &other)),
    }))
}

fn cast_number(value: Bson) -> Bson {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => value,
        Bson::Boolean(b) => Bson::Int32(b as i32),
        Bson::String(s) => Bson::Double(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        Bson::DateTime(dt) => Bson::Int64(dt.timestamp_millis()),
        _ => Bson::Double(f64::NAN),
    }
}

fn cast_boolean(value: Bson) -> Result<Bson, CastError> {
    match &value {
        Bson::Boolean(b) => Ok(Bson::Boolean(*b)),
        Bson::Int32(n) => Ok(Bson::Boolean(*n != 0)),
        Bson::Int64(n) => Ok(Bson::Boolean(*n != 0)),
        Bson::Double(n) => Ok(Bson::Boolean(*n != 0.0)),
        Bson::String(s) => match s.trim() {
            "true" | "1" => Ok(Bson::Boolean(true)),
            "false" | "0" => Ok(Bson::Boolean(false)),
            _ => Err(CastError::new("Boolean", &value)),
        },
        _ => Err(CastError::new("Boolean", &value)),
    }
}

fn cast_object_id(value: Bson) -> Result<Bson, CastError> {
    match &value {
        Bson::ObjectId(oid) => Ok(Bson::ObjectId(*oid)),
        Bson::String(hex) => ObjectId::parse_str(hex)
            .map(Bson::ObjectId)
            .map_err(|_| CastError::new("ObjectId", &value)),
        _ => Err(CastError::new("ObjectId", &value)),
    }
}

fn cast_date(value: Bson) -> Result<Bson, CastError> {
    match value {
        Bson::DateTime(_) => Ok(value),
        Bson::Int32(millis) => Ok(Bson::DateTime(DateTime::from_millis(millis as i64))),
        Bson::Int64(millis) => Ok(Bson::DateTime(DateTime::from_millis(millis))),
        Bson::Double(millis) if millis.is_finite() => {
            Ok(Bson::DateTime(DateTime::from_millis(millis as i64)))
        }
        Bson::String(s) => Ok(parse_date(s.trim())
            .map(Bson::DateTime)
            .unwrap_or(Bson::Null)),
        other => Err(CastError::new("Date", &other)),
    }
}

fn parse_date(input: &str) -> Option<DateTime> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(input) {
        return Some(DateTime::from_millis(parsed.timestamp_millis()));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Some(DateTime::from_millis(parsed.and_utc().timestamp_millis()));
    }

    if let Ok(parsed) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(DateTime::from_millis(
            parsed
                .and_hms_opt(0, 0, 0)?
                .and_utc()
                .timestamp_millis(),
        ));
    }

    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return input
            .parse::<i64>()
            .ok()
            .map(DateTime::from_millis);
    }

    None
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use std::sync::Arc;

    use super::*;
    use crate::schema::Schema;

    #[test]
    fn number_cast_is_idempotent_and_parses_strings() {
        assert_eq!(SchemaType::Number.cast(Bson::Int32(5)).unwrap(), Bson::Int32(5));
        assert_eq!(SchemaType::Number.cast(Bson::String("5".into())).unwrap(), Bson::Double(5.0));
    }

    #[test]
    fn non_numeric_input_yields_nan() {
        let cast = SchemaType::Number
            .cast(Bson::String("five".into()))
            .unwrap();

        assert!(matches!(cast, Bson::Double(n) if n.is_nan()));
    }

    #[test]
    fn string_cast_converts_scalars() {
        assert_eq!(SchemaType::String.cast(Bson::Int32(7)).unwrap(), Bson::String("7".into()));
        assert_eq!(SchemaType::String.cast(Bson::Boolean(true)).unwrap(), Bson::String("true".into()));
        assert!(SchemaType::String.cast(Bson::Document(doc! {})).is_err());
    }

    #[test]
    fn object_id_cast_rejects_malformed_input() {
        let err = SchemaType::ObjectId
            .cast(Bson::String("not-a-valid-id".into()))
            .unwrap_err();

        assert_eq!(err.kind, "ObjectId");
    }

    #[test]
    fn object_id_cast_round_trips_hex() {
        let hex = "4e4f3a3b2c1d0e0f10111213";
        let cast = SchemaType::ObjectId
            .cast(Bson::String(hex.into()))
            .unwrap();

        match cast {
            Bson::ObjectId(oid) => assert_eq!(oid.to_hex(), hex),
            other => panic!("expected an ObjectId, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_date_casts_to_null() {
        assert_eq!(SchemaType::Date.cast(Bson::String("tomorrow-ish".into())).unwrap(), Bson::Null);
    }

    #[test]
    fn date_cast_accepts_rfc3339_and_epoch() {
        let expected = Bson::DateTime(DateTime::from_millis(86_400_000));

        assert_eq!(SchemaType::Date.cast(Bson::String("1970-01-02T00:00:00Z".into())).unwrap(), expected);
        assert_eq!(SchemaType::Date.cast(Bson::String("1970-01-02".into())).unwrap(), expected);
        assert_eq!(SchemaType::Date.cast(Bson::Int64(86_400_000)).unwrap(), expected);
    }

    #[test]
    fn array_cast_wraps_single_values() {
        let ty = SchemaType::Array(Box::new(SchemaType::Number));

        assert_eq!(ty.cast(Bson::String("3".into())).unwrap(), Bson::Array(vec![Bson::Double(3.0)]));
    }

    #[test]
    fn array_cast_drops_elements_that_fail() {
        let ty = SchemaType::Array(Box::new(SchemaType::ObjectId));
        let valid = ObjectId::new();
        let cast = ty
            .cast(Bson::Array(vec![
                Bson::String(valid.to_hex()),
                Bson::String("bogus".into()),
            ]))
            .unwrap();

        assert_eq!(cast, Bson::Array(vec![Bson::ObjectId(valid)]));
    }

    #[test]
    fn document_array_casts_embedded_paths() {
        let comment = Schema::builder()
            .field("votes", SchemaType::Number)
            .build()
            .unwrap();
        let ty = SchemaType::Array(Box::new(SchemaType::Documents(Arc::new(comment))));

        let cast = ty
            .cast(Bson::Array(vec![
                Bson::Document(doc! { "votes": "2" }),
                Bson::String("not a document".into()),
            ]))
            .unwrap();

        assert_eq!(cast, Bson::Array(vec![Bson::Document(doc! { "votes": 2.0 })]));
    }

    #[test]
    fn null_passes_through_every_rule() {
        for ty in [SchemaType::String, SchemaType::ObjectId, SchemaType::Date] {
            assert_eq!(ty.cast(Bson::Null).unwrap(), Bson::Null);
        }
    }
}

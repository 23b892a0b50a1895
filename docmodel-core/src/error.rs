//! Error types and result types for document model operations.
//!
//! Every fallible operation in this crate returns [`DocModelResult<T>`]. Casting and
//! query-construction failures travel through the same `Result` as successful values;
//! nothing is reported through a side channel.

use bson::{Bson, error::Error as BsonError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A value could not be converted to the type declared for its path.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cast to {kind} failed for value {value}{}", path.as_deref().map(|p| format!(" at path \"{p}\"")).unwrap_or_default())]
pub struct CastError {
    /// The name of the declared type (e.g. `ObjectId`).
    pub kind: &'static str,
    /// A printable rendition of the offending value.
    pub value: String,
    /// The schema path being cast, when known.
    pub path: Option<String>,
}

impl CastError {
    pub fn new(kind: &'static str, value: &Bson) -> Self {
        Self {
            kind,
            value: value.to_string(),
            path: None,
        }
    }

    /// Attaches the schema path to this error.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Represents all possible errors that can occur while working with models, queries
/// and connections.
#[derive(Error, Debug)]
pub enum DocModelError {
    /// A value could not be converted to its declared type.
    #[error(transparent)]
    Cast(#[from] CastError),
    /// A connection lifecycle call was made from a state that does not allow it.
    #[error("Connection state error: {0}")]
    ConnectionState(String),
    /// A collection verb was invoked on a backend that does not implement it.
    #[error("Operation not implemented: {0}")]
    UnimplementedOperation(String),
    /// The query is malformed or cannot be executed.
    #[error("Query error: {0}")]
    Query(String),
    /// A streaming cursor was used after it reported exhaustion.
    #[error("cursor is closed")]
    CursorClosed,
    /// An error reported by the underlying driver, passed through as-is.
    #[error("Driver error: {0}")]
    Driver(String),
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The schema description could not be compiled.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// A path could not be walked in the working document.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// Connection options could not be parsed or are incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A specialized `Result` type for document model operations.
pub type DocModelResult<T> = Result<T, DocModelError>;

impl From<BsonError> for DocModelError {
    fn from(err: BsonError) -> Self {
        DocModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocModelError {
    fn from(err: SerdeJsonError) -> Self {
        DocModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_error_message_includes_path() {
        let err = CastError::new("ObjectId", &Bson::String("nope".into())).at("owner");

        assert_eq!(
            err.to_string(),
            "Cast to ObjectId failed for value \"nope\" at path \"owner\""
        );
    }

    #[test]
    fn cursor_closed_message() {
        assert_eq!(DocModelError::CursorClosed.to_string(), "cursor is closed");
    }
}

//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    backend::{BackendCollection, BackendCursor, RemoveOptions, StoreBackend, StoreBackendBuilder, UpdateOptions},
    collection::Collection,
    config::ConnectionOptions,
    connection::{Connection, ConnectionState},
    cursor::{Advance, QueryCursor},
    error::{CastError, DocModelError, DocModelResult},
    instance::{Instance, Namespace, NamespaceMut},
    model::Model,
    page::{Page, PaginationParams},
    query::{IntoProjection, Query, QueryOp, QueryOptions, QueryOutput, SortDirection},
    schema::{Schema, SchemaBuilder, SchemaType},
    scope::Scope,
};

//! Main docmodel crate providing a unified interface for schema-driven documents.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports the
//! core types from `docmodel-core` and gives access to the storage backends.
//!
//! # Features
//!
//! - **Schemas** - Declare document shapes with per-path casting, getters, setters,
//!   virtual properties, methods and named scopes
//! - **Change tracking** - Saving an instance sends only the paths that changed
//! - **Fluent queries** - Compose conditions and options, then execute or stream them
//! - **Connection buffering** - Operations issued before the connection is open run
//!   once it opens, in the order they were issued
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocModelResult<()> {
//!     let connection = Connection::new(InMemoryStore::new(), ConnectionOptions::parse("mongodb://localhost/blog")?);
//!
//!     let posts = connection.model(
//!         "posts",
//!         Schema::builder()
//!             .field("title", SchemaType::String)
//!             .field("votes", SchemaType::Number)
//!             .array("tags", SchemaType::String)
//!             .scope("popular", Scope::conditions(doc! { "votes": { "$gte": 10 } }))
//!             .build()?,
//!     );
//!
//!     // Issued before the connection is open; runs once it opens.
//!     let mut post = posts.create(doc! { "title": "Hello", "votes": "12" })?;
//!     let saving = async { post.save().await };
//!     let (opened, saved) = futures::join!(connection.open(), saving);
//!     opened?;
//!     saved?;
//!
//!     let popular = posts.scope("popular")?.desc(&["votes"]).find().await?;
//!     println!("{} popular posts", popular.len());
//!
//!     connection.close().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process storage for development and testing
//! - [`mongodb`] - MongoDB through the official driver (requires the `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    backend, cast, collection, condition, config, connection, cursor, error, instance, model,
    page, path, query, schema, scope,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}

//! A document modeling layer over document-database drivers.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Schemas** ([`schema`], [`cast`]) - Compiled document shapes with per-path casting rules
//! - **Instances** ([`instance`]) - Documents with getter/setter hooks and dirty tracking
//! - **Queries** ([`query`], [`condition`], [`cursor`]) - A fluent query builder with schema-aware
//!   condition casting and streaming results
//! - **Scopes** ([`scope`]) - Named, reusable query fragments
//! - **Models** ([`model`]) - Schemas bound to collections
//! - **Connections** ([`connection`], [`collection`]) - Connection lifecycle with operation
//!   buffering until the connection is open
//! - **Backends** ([`backend`]) - Traits a storage driver implements
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::{connection::Connection, schema::{Schema, SchemaType}};
//! use bson::doc;
//!
//! let connection = Connection::new(backend, ConnectionOptions::parse("mongodb://localhost/blog")?);
//! let posts = connection.model(
//!     "posts",
//!     Schema::builder()
//!         .field("title", SchemaType::String)
//!         .array("tags", SchemaType::String)
//!         .build()?,
//! );
//!
//! // Buffered until the connection opens.
//! let mut post = posts.create(doc! { "title": "Hello", "tags": "intro" })?;
//! let saved = post.save();
//!
//! connection.open().await?;
//! saved.await?;
//! ```

pub mod backend;
pub mod cast;
pub mod collection;
pub mod condition;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod instance;
pub mod model;
pub mod page;
pub mod path;
pub mod query;
pub mod schema;
pub mod scope;

#[cfg(test)]
pub(crate) mod testing;

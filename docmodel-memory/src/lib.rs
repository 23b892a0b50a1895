//! In-memory backend for docmodel.
//!
//! [`InMemoryStore`] implements the driver traits from `docmodel-core` entirely in
//! process. It understands the condition documents the query builder produces,
//! including comparison, membership, regular expression and geo operators, and the
//! common update operators (`$set`, `$unset`, `$inc`, `$push`, `$addToSet`, `$pull`,
//! `$pop`, `$setOnInsert`). It is meant for tests and for prototyping without a
//! database server.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel_memory::InMemoryStore;
//!
//! let connection = Connection::new(InMemoryStore::new(), ConnectionOptions::default());
//! connection.open().await?;
//! ```

mod evaluator;
mod update;

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};

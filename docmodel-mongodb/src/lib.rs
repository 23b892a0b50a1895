//! MongoDB backend for docmodel.
//!
//! This crate implements the `docmodel-core` driver traits on top of the official
//! MongoDB driver. Conditions and update documents produced by the query builder
//! are already in MongoDB's own syntax, so they are sent to the server unchanged.
//!
//! To use this backend, enable the `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{prelude::*, mongodb::MongoDbStore};
//!
//! let connection = Connection::new(
//!     MongoDbStore::builder().app_name("blog").build().await?,
//!     ConnectionOptions::parse("mongodb://localhost:27017/blog")?,
//! );
//! connection.open().await?;
//! ```

mod options;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};

//! Driver boundary for document storage backends.
//!
//! This module defines the traits a storage driver implements so that connections,
//! collections and queries can run on top of it. The core never talks to a socket
//! itself; it only calls the verbs below.
//!
//! # Overview
//!
//! - [`StoreBackend`]: connection-like object with an `open`/`close` lifecycle,
//!   authentication, and access to named collections
//! - [`BackendCollection`]: collection-level verbs (`find`, `find_one`, `insert`,
//!   `update`, `remove`, `count`)
//! - [`BackendCursor`]: a pull-based result cursor
//! - [`StoreBackendBuilder`]: factory trait for creating backend instances
//!
//! Every collection verb has a default implementation that fails with
//! [`DocModelError::UnimplementedOperation`], so a backend only implements what it
//! supports.
//!
//! # Examples
//!
//! ```ignore
//! use docmodel_core::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! backend.open(&ConnectionOptions::default()).await?;
//!
//! let users = backend.collection("users");
//! users.insert(vec![doc! { "name": "Alice", "age": 30 }]).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Document, doc};
use std::{collections::VecDeque, fmt::Debug, sync::Arc};

use crate::{
    config::ConnectionOptions,
    error::{DocModelError, DocModelResult},
    query::QueryOptions,
};

/// Options for update operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first one.
    pub multi: bool,
    /// Insert a document built from the conditions and changes when nothing matches.
    pub upsert: bool,
}

/// Options for remove operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove at most one matching document.
    pub just_one: bool,
}

/// Builds the acknowledgement document returned by write verbs.
///
/// `n` is the number of documents affected.
pub fn acknowledgement(n: u64) -> Document {
    doc! { "n": n as i64, "ok": 1 }
}

/// Abstract interface for a storage driver connection.
///
/// Implementations must be thread-safe. `open` and `close` are only called by the
/// connection state machine, which guarantees they never overlap.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Establishes the underlying connection.
    async fn open(&self, options: &ConnectionOptions) -> DocModelResult<()>;

    /// Tears down the underlying connection.
    async fn close(&self) -> DocModelResult<()>;

    /// Authenticates the open connection.
    ///
    /// Called right after a successful [`open`](StoreBackend::open) when credentials
    /// are configured, before any buffered operation is replayed.
    async fn authenticate(&self, _user: &str, _password: &str) -> DocModelResult<()> {
        Err(DocModelError::UnimplementedOperation("authenticate".to_string()))
    }

    /// Returns a handle to the named collection.
    ///
    /// Obtaining a handle must not perform I/O.
    fn collection(&self, name: &str) -> Arc<dyn BackendCollection>;
}

/// Collection-level verbs exposed by a driver.
#[async_trait]
pub trait BackendCollection: Send + Sync {
    /// Finds every document matching `conditions`.
    async fn find(
        &self,
        _conditions: Document,
        _options: QueryOptions,
    ) -> DocModelResult<Box<dyn BackendCursor>> {
        Err(DocModelError::UnimplementedOperation("find".to_string()))
    }

    /// Finds the first document matching `conditions`.
    async fn find_one(
        &self,
        _conditions: Document,
        _options: QueryOptions,
    ) -> DocModelResult<Option<Document>> {
        Err(DocModelError::UnimplementedOperation("findOne".to_string()))
    }

    /// Inserts documents, returning the backend's acknowledgement.
    async fn insert(&self, _documents: Vec<Document>) -> DocModelResult<Document> {
        Err(DocModelError::UnimplementedOperation("insert".to_string()))
    }

    /// Applies `changes` to documents matching `conditions`.
    async fn update(
        &self,
        _conditions: Document,
        _changes: Document,
        _options: UpdateOptions,
    ) -> DocModelResult<Document> {
        Err(DocModelError::UnimplementedOperation("update".to_string()))
    }

    /// Removes documents matching `conditions`.
    async fn remove(
        &self,
        _conditions: Document,
        _options: RemoveOptions,
    ) -> DocModelResult<Document> {
        Err(DocModelError::UnimplementedOperation("remove".to_string()))
    }

    /// Counts documents matching `conditions`.
    async fn count(&self, _conditions: Document) -> DocModelResult<u64> {
        Err(DocModelError::UnimplementedOperation("count".to_string()))
    }
}

/// A pull-based cursor over query results.
#[async_trait]
pub trait BackendCursor: Send {
    /// Returns the next document, or `None` once the cursor is exhausted.
    async fn next(&mut self) -> DocModelResult<Option<Document>>;

    /// Drains the remaining documents.
    async fn to_array(&mut self) -> DocModelResult<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(document) = self.next().await? {
            documents.push(document);
        }

        Ok(documents)
    }
}

/// A cursor over documents already held in memory.
#[derive(Debug, Default)]
pub struct VecCursor {
    documents: VecDeque<Document>,
}

impl VecCursor {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents: documents.into() }
    }
}

#[async_trait]
impl BackendCursor for VecCursor {
    async fn next(&mut self) -> DocModelResult<Option<Document>> {
        Ok(self.documents.pop_front())
    }

    async fn to_array(&mut self) -> DocModelResult<Vec<Document>> {
        Ok(self.documents.drain(..).collect())
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocModelResult<Self::Backend>;
}

//! Models: a schema bound to a collection.
//!
//! A [`Model`] creates and hydrates [`Instance`]s and is the entry point for
//! queries. Static query helpers such as [`Model::find`] return a [`Query`] bound to
//! the model; nothing runs until the query is executed.
//!
//! ```ignore
//! let posts = connection.model("posts", schema);
//!
//! let mut post = posts.create(doc! { "title": "Hello" })?;
//! post.save().await?;
//!
//! let recent = posts.find(doc! {}).desc(&["date"]).limit(10).find().await?;
//! ```

use bson::{Bson, Document, ser::serialize_to_bson};
use serde::Serialize;
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    backend::UpdateOptions,
    collection::Collection,
    error::{DocModelError, DocModelResult},
    instance::Instance,
    query::{Query, QueryOp},
    schema::{ID_PATH, Schema},
};

struct ModelInner {
    name: String,
    schema: Arc<Schema>,
    collection: Arc<Collection>,
}

/// A schema bound to a collection. Clones share the same model.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    pub fn new(name: impl Into<String>, schema: Arc<Schema>, collection: Arc<Collection>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                name: name.into(),
                schema,
                collection,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.inner.collection
    }

    /// Builds a new, unsaved instance.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Cast`] when a supplied value cannot be cast.
    pub fn create(&self, doc: Document) -> DocModelResult<Instance> {
        Ok(Instance::new(Arc::clone(&self.inner.schema), doc)?.with_model(self.clone()))
    }

    /// Builds a new, unsaved instance from a serializable value.
    pub fn create_from<T: Serialize>(&self, value: &T) -> DocModelResult<Instance> {
        match serialize_to_bson(value)? {
            Bson::Document(doc) => self.create(doc),
            other => Err(DocModelError::Serialization(format!(
                "expected a document, got {other}"
            ))),
        }
    }

    /// Wraps a stored document in an instance without casting it.
    pub fn hydrate(&self, doc: Document) -> Instance {
        Instance::hydrate(Arc::clone(&self.inner.schema), doc).with_model(self.clone())
    }

    /// An empty query bound to this model.
    pub fn query(&self) -> Query {
        Query::new().bind(self.clone(), QueryOp::Find)
    }

    pub fn find(&self, conditions: Document) -> Query {
        self.query().with_conditions(conditions)
    }

    pub fn find_one(&self, conditions: Document) -> Query {
        self.bound(conditions, QueryOp::FindOne)
    }

    pub fn find_by_id(&self, id: impl Into<Bson>) -> Query {
        let mut conditions = Document::new();
        conditions.insert(ID_PATH, id.into());
        self.find_one(conditions)
    }

    pub fn count(&self, conditions: Document) -> Query {
        self.bound(conditions, QueryOp::Count)
    }

    pub fn update(&self, conditions: Document, changes: Document) -> Query {
        self.update_with(conditions, changes, UpdateOptions::default())
    }

    pub fn update_with(&self, conditions: Document, changes: Document, options: UpdateOptions) -> Query {
        self.bound(conditions, QueryOp::Update { changes, options })
    }

    pub fn remove(&self, conditions: Document) -> Query {
        self.bound(conditions, QueryOp::Remove)
    }

    /// A query with the named scope applied.
    pub fn scope(&self, name: &str) -> DocModelResult<Query> {
        self.query().scope(name)
    }

    pub fn scope_with(&self, name: &str, args: &[Bson]) -> DocModelResult<Query> {
        self.query().scope_with(name, args)
    }

    fn bound(&self, conditions: Document, op: QueryOp) -> Query {
        Query::new()
            .with_conditions(conditions)
            .bind(self.clone(), op)
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("collection", &self.inner.collection.name())
            .finish_non_exhaustive()
    }
}

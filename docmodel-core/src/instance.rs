//! Document instances with change tracking.
//!
//! An [`Instance`] owns a working document shaped by its [`Schema`], a snapshot of the
//! last committed value of every tracked path, and the set of paths explicitly written
//! since that commit. [`Instance::get_dirty`] diffs the working document against the
//! snapshot; [`Instance::save`] persists that diff and commits only once the backend
//! acknowledges the write.
//!
//! # Example
//!
//! ```ignore
//! let mut post = posts.create(doc! { "title": "Hello" })?;
//! post.save().await?;
//!
//! post.set("meta.votes", 3.0)?;
//! assert_eq!(post.get_dirty(), doc! { "meta.votes": 3.0 });
//! post.save().await?; // issues { $set: { "meta.votes": 3.0 } }
//! ```

use bson::{Bson, Document, de::deserialize_from_bson, doc, oid::ObjectId, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::{self, Debug},
    sync::Arc,
};
use tracing::{debug, warn};

use crate::{
    backend::{RemoveOptions, UpdateOptions},
    error::{DocModelError, DocModelResult},
    model::Model,
    path,
    schema::{ID_PATH, Schema},
};

/// A document bound to a schema, tracking modifications since its last commit.
#[derive(Clone)]
pub struct Instance {
    schema: Arc<Schema>,
    model: Option<Model>,
    doc: Document,
    snapshot: BTreeMap<String, String>,
    dirty: BTreeSet<String>,
    is_new: bool,
}

impl Instance {
    /// Builds a new, unsaved instance from `input`.
    ///
    /// The working document starts from the schema shape, receives a fresh `_id` when
    /// none was supplied, and has every declared path cast. The resulting values form
    /// the baseline snapshot, so a freshly built instance has an empty diff.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Cast`] when a supplied value cannot be cast.
    pub fn new(schema: Arc<Schema>, input: Document) -> DocModelResult<Self> {
        let mut doc = schema.shape().clone();
        path::merge(&mut doc, input);

        if schema.path_type(ID_PATH).is_some()
            && matches!(doc.get(ID_PATH), None | Some(Bson::Null))
        {
            doc.insert(ID_PATH, ObjectId::new());
        }

        let mut instance = Self::unchecked(schema, doc, true);
        instance.cast_all()?;
        instance.take_snapshot();

        Ok(instance)
    }

    /// Builds an instance from a document loaded from storage.
    ///
    /// Stored values are taken as-is; they seed the snapshot without casting.
    pub fn hydrate(schema: Arc<Schema>, stored: Document) -> Self {
        let mut doc = schema.shape().clone();
        path::merge(&mut doc, stored);

        let mut instance = Self::unchecked(schema, doc, false);
        instance.take_snapshot();
        instance
    }

    fn unchecked(schema: Arc<Schema>, doc: Document, is_new: bool) -> Self {
        Self {
            schema,
            model: None,
            doc,
            snapshot: BTreeMap::new(),
            dirty: BTreeSet::new(),
            is_new,
        }
    }

    pub(crate) fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Whether this instance has never been persisted.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn id(&self) -> Option<&Bson> {
        self.doc.get(ID_PATH)
    }

    /// The working document.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Mutable access to the working document.
    ///
    /// Writes made here bypass casting and dirty marking; [`get_dirty`](Self::get_dirty)
    /// still reports them by comparing against the snapshot.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn to_document(&self) -> Document {
        self.doc.clone()
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Reads `path`, applying its getter hook when one is installed.
    pub fn get(&self, path: &str) -> Option<Bson> {
        let raw = self.get_raw(path)?.clone();

        match self.schema.accessor(path).and_then(|a| a.getter.as_ref()) {
            Some(getter) => Some(getter(raw)),
            None => Some(raw),
        }
    }

    /// Reads the stored value at `path` without hooks.
    pub fn get_raw(&self, path: &str) -> Option<&Bson> {
        path::get(&self.doc, path)
    }

    /// Writes `value` at `path` through its setter hook.
    ///
    /// A setter hook that returns `None` leaves the stored value untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Cast`] when the value cannot be cast to the declared
    /// type and [`DocModelError::InvalidPath`] when the path cannot be walked.
    pub fn set(&mut self, path: &str, value: impl Into<Bson>) -> DocModelResult<()> {
        let value = value.into();
        let value = match self.schema.accessor(path).and_then(|a| a.setter.as_ref()) {
            Some(setter) => setter(value),
            None => Some(value),
        };

        match value {
            Some(value) => self.set_path(path, value, false),
            None => Ok(()),
        }
    }

    /// Casts and writes `value` at `path`, bypassing setter hooks.
    ///
    /// Writing a value equal to the current one is a no-op. Unless `internal` is set,
    /// a changed path is marked dirty.
    pub fn set_path(&mut self, path: &str, value: Bson, internal: bool) -> DocModelResult<()> {
        if path::get(&self.doc, path) == Some(&value) {
            return Ok(());
        }

        let value = match self.schema.path_type(path) {
            Some(ty) => ty.cast(value).map_err(|err| err.at(path))?,
            None => value,
        };

        path::set(&mut self.doc, path, value)?;
        if !internal {
            self.dirty.insert(path.to_string());
        }

        Ok(())
    }

    /// Whether `path`, or anything below it, differs from the last commit.
    pub fn is_modified(&self, path: &str) -> bool {
        let prefix = format!("{path}{}", path::SEPARATOR);

        self.get_dirty()
            .keys()
            .any(|changed| changed == path || changed.starts_with(&prefix))
    }

    /// Computes the changes since the last commit, keyed by dotted path.
    ///
    /// Explicitly written paths are checked first. Every other tracked path is then
    /// compared against the snapshot, which catches writes that bypassed
    /// [`set`](Self::set). Ancestors and descendants of a reported path are not
    /// reported again.
    ///
    /// This does not touch the snapshot; it is refreshed only after a successful save.
    pub fn get_dirty(&self) -> Document {
        let mut changes = Document::new();
        let mut excluded = HashSet::new();

        // Ancestors sort before their descendants, so a written parent is seen first.
        for path in &self.dirty {
            let current = path::get(&self.doc, path);
            if !covered_by(&changes, path) && self.snapshot.get(path) != Some(&canonical(current)) {
                changes.insert(path.clone(), current.cloned().unwrap_or(Bson::Null));
            }
            excluded.extend(path::ancestors(path));
        }

        for (path, committed) in &self.snapshot {
            if excluded.contains(path.as_str())
                || changes.contains_key(path)
                || covered_by(&changes, path)
            {
                continue;
            }

            let current = path::get(&self.doc, path);
            if canonical(current) != *committed {
                changes.insert(path.clone(), current.cloned().unwrap_or(Bson::Null));
            }
        }

        changes
    }

    /// Accepts the current working document as the committed state.
    pub fn commit(&mut self) {
        self.take_snapshot();
        self.dirty.clear();
        self.is_new = false;
    }

    /// A read view over the nested namespace at `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::InvalidPath`] when `prefix` is not a declared namespace.
    pub fn namespace(&self, prefix: &str) -> DocModelResult<Namespace<'_>> {
        self.check_namespace(prefix)?;

        Ok(Namespace {
            instance: self,
            prefix: prefix.to_string(),
        })
    }

    /// A read/write view over the nested namespace at `prefix`.
    pub fn namespace_mut(&mut self, prefix: &str) -> DocModelResult<NamespaceMut<'_>> {
        self.check_namespace(prefix)?;

        Ok(NamespaceMut {
            instance: self,
            prefix: prefix.to_string(),
        })
    }

    fn check_namespace(&self, prefix: &str) -> DocModelResult<()> {
        if self.schema.is_namespace(prefix) {
            Ok(())
        } else {
            Err(DocModelError::InvalidPath(format!("\"{prefix}\" is not a nested namespace")))
        }
    }

    /// Reads a virtual property.
    pub fn get_virtual(&self, name: &str) -> DocModelResult<Bson> {
        let getter = self
            .schema
            .virtual_property(name)
            .and_then(|v| v.getter.clone())
            .ok_or_else(|| DocModelError::InvalidPath(format!("no virtual getter \"{name}\"")))?;

        Ok(getter(self))
    }

    /// Writes a virtual property.
    pub fn set_virtual(&mut self, name: &str, value: impl Into<Bson>) -> DocModelResult<()> {
        let setter = self
            .schema
            .virtual_property(name)
            .and_then(|v| v.setter.clone())
            .ok_or_else(|| DocModelError::InvalidPath(format!("no virtual setter \"{name}\"")))?;

        setter(self, value.into())
    }

    /// Invokes a schema method on this instance.
    pub fn call(&mut self, method: &str, args: &[Bson]) -> DocModelResult<Bson> {
        let method = self
            .schema
            .method(method)
            .cloned()
            .ok_or_else(|| DocModelError::InvalidPath(format!("no method \"{method}\"")))?;

        method(self, args)
    }

    /// Deserializes the working document into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DocModelResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.doc.clone()))?)
    }

    /// Writes every field of a serializable value through [`set`](Self::set).
    pub fn assign<T: Serialize>(&mut self, value: &T) -> DocModelResult<()> {
        let Bson::Document(fields) = serialize_to_bson(value)? else {
            return Err(DocModelError::Serialization(
                "value did not serialize to a document".to_string(),
            ));
        };

        for (key, value) in fields {
            self.set(&key, value)?;
        }

        Ok(())
    }

    /// Persists this instance.
    ///
    /// A new instance is inserted whole. A persisted one issues a `$set` of
    /// [`get_dirty`](Self::get_dirty) keyed by `_id`, or nothing when the diff is empty.
    /// The snapshot is refreshed only after the backend acknowledges the write, so a
    /// failed save leaves the diff intact for a retry.
    ///
    /// Clones of this instance keep their own snapshots; saving one does not commit
    /// the others.
    pub async fn save(&mut self) -> DocModelResult<()> {
        let model = self.bound_model("save")?;
        let collection = model.collection();

        if self.is_new {
            collection
                .insert(vec![self.doc.clone()])
                .await
                .inspect_err(|err| warn!(collection = %collection.name(), error = %err, "insert failed"))?;
            self.commit();
            return Ok(());
        }

        let changes = self.get_dirty();
        if changes.is_empty() {
            self.commit();
            return Ok(());
        }

        let id = self.persisted_id()?;
        debug!(collection = %collection.name(), paths = changes.len(), "saving partial update");

        collection
            .update(doc! { ID_PATH: id }, doc! { "$set": changes }, UpdateOptions::default())
            .await
            .inspect_err(|err| warn!(collection = %collection.name(), error = %err, "update failed"))?;
        self.commit();

        Ok(())
    }

    /// Removes the stored document with this instance's `_id`.
    pub async fn remove(&self) -> DocModelResult<Document> {
        let model = self.bound_model("remove")?;
        let id = self.persisted_id()?;

        model
            .collection()
            .remove(doc! { ID_PATH: id }, RemoveOptions { just_one: true })
            .await
    }

    fn bound_model(&self, verb: &str) -> DocModelResult<Model> {
        self.model.clone().ok_or_else(|| {
            DocModelError::UnimplementedOperation(format!("{verb}: instance is not bound to a model"))
        })
    }

    fn persisted_id(&self) -> DocModelResult<Bson> {
        match self.id() {
            None | Some(Bson::Null) => Err(DocModelError::InvalidPath(format!(
                "instance has no \"{ID_PATH}\""
            ))),
            Some(id) => Ok(id.clone()),
        }
    }

    fn cast_all(&mut self) -> DocModelResult<()> {
        let schema = Arc::clone(&self.schema);

        for (key, ty) in schema.casters() {
            if let Some(slot) = path::get_mut(&mut self.doc, key) {
                let raw = std::mem::replace(slot, Bson::Null);
                *slot = ty.cast(raw).map_err(|err| err.at(key))?;
            }
        }

        Ok(())
    }

    fn take_snapshot(&mut self) {
        let tracked = self
            .schema
            .paths()
            .iter()
            .cloned()
            .chain(self.snapshot.keys().cloned())
            .chain(self.dirty.iter().cloned())
            .collect::<BTreeSet<_>>();

        self.snapshot = tracked
            .into_iter()
            .map(|path| {
                let value = canonical(path::get(&self.doc, &path));
                (path, value)
            })
            .collect();
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("doc", &self.doc)
            .field("dirty", &self.dirty)
            .field("is_new", &self.is_new)
            .finish_non_exhaustive()
    }
}

// Missing and null serialize differently so that unsetting a field is a change.
fn canonical(value: Option<&Bson>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

fn covered_by(changes: &Document, path: &str) -> bool {
    path::ancestors(path)
        .into_iter()
        .any(|ancestor| changes.contains_key(ancestor))
}

/// A read view over a nested namespace of an [`Instance`].
///
/// Views are built on demand and hold no state of their own.
pub struct Namespace<'a> {
    instance: &'a Instance,
    prefix: String,
}

impl Namespace<'_> {
    pub fn get(&self, name: &str) -> Option<Bson> {
        self.instance.get(&self.full(name))
    }

    /// A view over a namespace nested inside this one.
    pub fn namespace(&self, name: &str) -> DocModelResult<Namespace<'_>> {
        self.instance.namespace(&self.full(name))
    }

    fn full(&self, name: &str) -> String {
        format!("{}{}{name}", self.prefix, path::SEPARATOR)
    }
}

/// A read/write view over a nested namespace of an [`Instance`].
pub struct NamespaceMut<'a> {
    instance: &'a mut Instance,
    prefix: String,
}

impl NamespaceMut<'_> {
    pub fn get(&self, name: &str) -> Option<Bson> {
        self.instance.get(&self.full(name))
    }

    pub fn set(&mut self, name: &str, value: impl Into<Bson>) -> DocModelResult<()> {
        let full = self.full(name);
        self.instance.set(&full, value)
    }

    pub fn namespace_mut(&mut self, name: &str) -> DocModelResult<NamespaceMut<'_>> {
        let full = self.full(name);
        self.instance.namespace_mut(&full)
    }

    fn full(&self, name: &str) -> String {
        format!("{}{}{name}", self.prefix, path::SEPARATOR)
    }
}

//! Schema compilation.
//!
//! A [`Schema`] is compiled once per model definition from either the fluent
//! [`SchemaBuilder`] or a JSON description ([`Schema::from_json`]) and is never mutated
//! afterwards. Compilation walks the declared properties recursively and produces:
//!
//! - the canonical document shape, with every leaf set to `null` and every array path
//!   set to an empty array,
//! - the casting rules keyed by dotted path,
//! - the set of array paths,
//! - the accessor table mapping leaf paths to their getter/setter hooks.
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::schema::{Schema, SchemaType};
//!
//! let schema = Schema::builder()
//!     .field("name", SchemaType::String)
//!     .nested("contact", |c| c
//!         .field("email", SchemaType::String)
//!         .field("phone", SchemaType::String))
//!     .array("tags", SchemaType::String)
//!     .documents("comments", |c| c
//!         .field("body", SchemaType::String)
//!         .field("date", SchemaType::Date))
//!     .build()?;
//!
//! assert!(schema.is_array("comments"));
//! ```

use bson::{Bson, Document};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{self, Debug},
    str::FromStr,
    sync::Arc,
};

use crate::{
    error::{CastError, DocModelError, DocModelResult},
    instance::Instance,
    path,
    scope::Scope,
};

/// The path of the document identifier.
pub const ID_PATH: &str = "_id";

/// Transforms a stored value on read.
pub type Getter = Arc<dyn Fn(Bson) -> Bson + Send + Sync>;
/// Transforms an incoming value before it is cast and written.
///
/// Returning `None` leaves the stored value untouched.
pub type Setter = Arc<dyn Fn(Bson) -> Option<Bson> + Send + Sync>;
/// Computes a virtual property from an instance.
pub type VirtualGetter = Arc<dyn Fn(&Instance) -> Bson + Send + Sync>;
/// Applies a value written to a virtual property.
pub type VirtualSetter = Arc<dyn Fn(&mut Instance, Bson) -> DocModelResult<()> + Send + Sync>;
/// A named instance behavior.
pub type Method = Arc<dyn Fn(&mut Instance, &[Bson]) -> DocModelResult<Bson> + Send + Sync>;

/// The declared type of a schema path.
#[derive(Debug, Clone)]
pub enum SchemaType {
    String,
    Number,
    Boolean,
    ObjectId,
    Date,
    /// No casting; values pass through unmodified.
    Mixed,
    /// An array whose elements are cast with the inner type.
    Array(Box<SchemaType>),
    /// An array of embedded documents described by their own schema.
    Documents(Arc<Schema>),
}

impl FromStr for SchemaType {
    type Err = DocModelError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "string" => Ok(SchemaType::String),
            "number" => Ok(SchemaType::Number),
            "boolean" | "bool" => Ok(SchemaType::Boolean),
            "objectid" | "id" => Ok(SchemaType::ObjectId),
            "date" => Ok(SchemaType::Date),
            "mixed" => Ok(SchemaType::Mixed),
            other => Err(DocModelError::InvalidSchema(format!("unknown type tag \"{other}\""))),
        }
    }
}

/// Getter and setter hooks installed for a leaf path.
#[derive(Clone, Default)]
pub struct Accessor {
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
}

/// A computed top-level property that does not correspond to a stored leaf.
#[derive(Clone, Default)]
pub struct VirtualProperty {
    pub getter: Option<VirtualGetter>,
    pub setter: Option<VirtualSetter>,
}

/// An index declaration. Stored on the schema and handed to backends as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Option<SchemaType>),
    Nested(Vec<(String, Node)>),
    Array(SchemaType),
}

/// A compiled, immutable document schema.
pub struct Schema {
    paths: Vec<String>,
    shape: Document,
    casters: BTreeMap<String, SchemaType>,
    arrays: BTreeSet<String>,
    namespaces: BTreeSet<String>,
    accessors: HashMap<String, Accessor>,
    virtuals: HashMap<String, VirtualProperty>,
    methods: HashMap<String, Method>,
    indexes: Vec<IndexSpec>,
    scopes: HashMap<String, Scope>,
}

impl Schema {
    /// Creates a new schema builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Compiles a schema from a JSON description.
    ///
    /// Each key maps to a type tag (`"string"`, `"number"`, `"boolean"`, `"objectid"`,
    /// `"date"`, `"mixed"`), `null` for an untyped leaf, an object for a nested
    /// namespace, or a one-element array for an array path. An array whose element is
    /// an object describes an array of embedded documents.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::InvalidSchema`] for unknown tags or non-object input.
    pub fn from_json(description: &Value) -> DocModelResult<Schema> {
        SchemaBuilder {
            nodes: nodes_from_json(description)?,
            ..SchemaBuilder::new()
        }
        .build()
    }

    /// Every declared leaf path, in declaration order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// The canonical document shape with `null` leaves.
    pub fn shape(&self) -> &Document {
        &self.shape
    }

    /// The declared type for an exact path, if any.
    pub fn path_type(&self, path: &str) -> Option<&SchemaType> {
        self.casters.get(path)
    }

    /// Every path that carries a casting rule, with its type.
    pub fn casters(&self) -> impl Iterator<Item = (&str, &SchemaType)> {
        self.casters
            .iter()
            .map(|(path, ty)| (path.as_str(), ty))
    }

    /// Whether `path` is declared as an array.
    pub fn is_array(&self, path: &str) -> bool {
        self.arrays.contains(path)
    }

    /// Every declared array path.
    pub fn array_paths(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(String::as_str)
    }

    /// Whether `path` names a nested namespace (an embedded object, not a leaf).
    pub fn is_namespace(&self, path: &str) -> bool {
        self.namespaces.contains(path)
    }

    /// The getter/setter hooks for a leaf path.
    pub fn accessor(&self, path: &str) -> Option<&Accessor> {
        self.accessors.get(path)
    }

    pub fn virtual_property(&self, name: &str) -> Option<&VirtualProperty> {
        self.virtuals.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    /// Casts every declared path present in `doc`.
    ///
    /// Used for embedded documents of a [`SchemaType::Documents`] array.
    pub fn cast_document(&self, mut doc: Document) -> Result<Document, CastError> {
        for (key, ty) in &self.casters {
            if let Some(slot) = path::get_mut(&mut doc, key) {
                let raw = std::mem::replace(slot, Bson::Null);
                *slot = ty.cast(raw).map_err(|err| err.at(key.as_str()))?;
            }
        }

        Ok(doc)
    }
}

impl Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("paths", &self.paths)
            .field("casters", &self.casters)
            .field("arrays", &self.arrays)
            .field("namespaces", &self.namespaces)
            .field("indexes", &self.indexes)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`Schema`].
///
/// Hooks declared inside a [`nested`](SchemaBuilder::nested) block are registered under
/// the prefixed path.
#[derive(Default)]
pub struct SchemaBuilder {
    nodes: Vec<(String, Node)>,
    getters: HashMap<String, Getter>,
    setters: HashMap<String, Setter>,
    virtuals: HashMap<String, VirtualProperty>,
    methods: HashMap<String, Method>,
    indexes: Vec<IndexSpec>,
    scopes: HashMap<String, Scope>,
    errors: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a typed leaf.
    pub fn field(mut self, name: impl Into<String>, ty: SchemaType) -> Self {
        self.push(name.into(), Node::Leaf(Some(ty)));
        self
    }

    /// Declares an untyped leaf.
    ///
    /// Names starting with `_` are treated as identifiers.
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.push(name.into(), Node::Leaf(None));
        self
    }

    /// Declares a nested namespace.
    pub fn nested<F>(mut self, name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(SchemaBuilder) -> SchemaBuilder,
    {
        let name = name.into();
        let inner = build(SchemaBuilder::new());

        self.errors.extend(inner.errors);
        for (path, getter) in inner.getters {
            self.getters.insert(format!("{name}.{path}"), getter);
        }
        for (path, setter) in inner.setters {
            self.setters.insert(format!("{name}.{path}"), setter);
        }

        self.push(name, Node::Nested(inner.nodes));
        self
    }

    /// Declares an array path whose elements are cast with `element`.
    pub fn array(mut self, name: impl Into<String>, element: SchemaType) -> Self {
        self.push(name.into(), Node::Array(element));
        self
    }

    /// Declares an array of embedded documents described by their own schema.
    pub fn documents<F>(mut self, name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(SchemaBuilder) -> SchemaBuilder,
    {
        let name = name.into();

        match build(SchemaBuilder::new()).compile(false) {
            Ok(schema) => self.push(name, Node::Array(SchemaType::Documents(Arc::new(schema)))),
            Err(err) => self.errors.push(format!("{name}: {err}")),
        }

        self
    }

    /// Installs a getter hook on a leaf path.
    pub fn getter<F>(mut self, path: impl Into<String>, getter: F) -> Self
    where
        F: Fn(Bson) -> Bson + Send + Sync + 'static,
    {
        self.getters.insert(path.into(), Arc::new(getter));
        self
    }

    /// Installs a setter hook on a leaf path.
    pub fn setter<F>(mut self, path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(Bson) -> Option<Bson> + Send + Sync + 'static,
    {
        self.setters.insert(path.into(), Arc::new(setter));
        self
    }

    /// Installs the read side of a computed property that is not stored.
    pub fn virtual_getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Instance) -> Bson + Send + Sync + 'static,
    {
        self.virtuals
            .entry(name.into())
            .or_default()
            .getter = Some(Arc::new(getter));
        self
    }

    /// Installs the write side of a computed property that is not stored.
    pub fn virtual_setter<F>(mut self, name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut Instance, Bson) -> DocModelResult<()> + Send + Sync + 'static,
    {
        self.virtuals
            .entry(name.into())
            .or_default()
            .setter = Some(Arc::new(setter));
        self
    }

    /// Registers a named instance behavior.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&mut Instance, &[Bson]) -> DocModelResult<Bson> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Declares an index over one or more keys (`1` ascending, `-1` descending).
    pub fn index(mut self, keys: &[(&str, i32)], unique: bool) -> Self {
        self.indexes.push(IndexSpec {
            keys: keys
                .iter()
                .map(|(key, direction)| (key.to_string(), *direction))
                .collect(),
            unique,
        });
        self
    }

    /// Registers a named scope.
    pub fn scope(mut self, name: impl Into<String>, scope: Scope) -> Self {
        self.scopes.insert(name.into(), scope);
        self
    }

    /// Compiles the schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::InvalidSchema`] when a property was declared twice or
    /// a nested declaration failed to compile.
    pub fn build(self) -> DocModelResult<Schema> {
        self.compile(true)
    }

    fn push(&mut self, name: String, node: Node) {
        if name.is_empty() || name.contains(path::SEPARATOR) {
            self.errors.push(format!("invalid property name \"{name}\""));
        } else if self.nodes.iter().any(|(existing, _)| *existing == name) {
            self.errors.push(format!("property \"{name}\" declared twice"));
        } else {
            self.nodes.push((name, node));
        }
    }

    fn compile(mut self, with_id: bool) -> DocModelResult<Schema> {
        if !self.errors.is_empty() {
            return Err(DocModelError::InvalidSchema(self.errors.join("; ")));
        }

        if with_id && !self.nodes.iter().any(|(name, _)| name == ID_PATH) {
            self.nodes.insert(0, (ID_PATH.to_string(), Node::Leaf(Some(SchemaType::ObjectId))));
        }

        let mut compiled = Compiled::default();
        compiled.walk(&self.nodes, None);

        let mut accessors = HashMap::new();
        for path in &compiled.paths {
            let accessor = Accessor {
                getter: self.getters.remove(path),
                setter: self.setters.remove(path),
            };
            accessors.insert(path.clone(), accessor);
        }

        // Hooks on names that are not schema leaves become virtual properties.
        let orphans = self
            .getters
            .keys()
            .chain(self.setters.keys())
            .cloned()
            .collect::<BTreeSet<_>>();
        for name in orphans {
            let getter = self.getters.remove(&name).map(|getter| {
                let key = name.clone();
                Arc::new(move |instance: &Instance| {
                    getter(instance.get_raw(&key).cloned().unwrap_or(Bson::Null))
                }) as VirtualGetter
            });
            let setter = self.setters.remove(&name).map(|setter| {
                let key = name.clone();
                Arc::new(move |instance: &mut Instance, value: Bson| match setter(value) {
                    Some(value) => instance.set_path(&key, value, false),
                    None => Ok(()),
                }) as VirtualSetter
            });
            self.virtuals
                .entry(name)
                .or_insert(VirtualProperty { getter, setter });
        }

        Ok(Schema {
            paths: compiled.paths,
            shape: compiled.shape,
            casters: compiled.casters,
            arrays: compiled.arrays,
            namespaces: compiled.namespaces,
            accessors,
            virtuals: self.virtuals,
            methods: self.methods,
            indexes: self.indexes,
            scopes: self.scopes,
        })
    }
}

#[derive(Default)]
struct Compiled {
    paths: Vec<String>,
    shape: Document,
    casters: BTreeMap<String, SchemaType>,
    arrays: BTreeSet<String>,
    namespaces: BTreeSet<String>,
}

impl Compiled {
    fn walk(&mut self, nodes: &[(String, Node)], prefix: Option<&str>) {
        for (name, node) in nodes {
            let full = match prefix {
                Some(prefix) => format!("{prefix}.{name}"),
                None => name.clone(),
            };

            match node {
                Node::Leaf(ty) => {
                    let ty = ty.clone().or_else(|| {
                        name.starts_with('_')
                            .then_some(SchemaType::ObjectId)
                    });
                    if let Some(ty) = ty {
                        self.casters.insert(full.clone(), ty);
                    }
                    self.place(&full, Bson::Null);
                    self.paths.push(full);
                }
                Node::Nested(children) => {
                    self.namespaces.insert(full.clone());
                    self.place(&full, Bson::Document(Document::new()));
                    self.walk(children, Some(&full));
                }
                Node::Array(element) => {
                    self.arrays.insert(full.clone());
                    self.casters
                        .insert(full.clone(), SchemaType::Array(Box::new(element.clone())));
                    self.place(&full, Bson::Array(Vec::new()));
                    self.paths.push(full);
                }
            }
        }
    }

    fn place(&mut self, full: &str, value: Bson) {
        // Names were validated, so every parent in the shape is a document.
        let _ = path::set(&mut self.shape, full, value);
    }
}

fn nodes_from_json(description: &Value) -> DocModelResult<Vec<(String, Node)>> {
    let Value::Object(map) = description else {
        return Err(DocModelError::InvalidSchema(
            "schema description must be an object".to_string(),
        ));
    };

    map.iter()
        .map(|(name, value)| Ok((name.clone(), node_from_json(name, value)?)))
        .collect()
}

fn node_from_json(name: &str, value: &Value) -> DocModelResult<Node> {
    match value {
        Value::Null => Ok(Node::Leaf(None)),
        Value::String(tag) => Ok(Node::Leaf(Some(tag.parse()?))),
        Value::Object(_) => Ok(Node::Nested(nodes_from_json(value)?)),
        Value::Array(items) => Ok(Node::Array(match items.first() {
            None | Some(Value::Null) | Some(Value::Array(_)) => SchemaType::Mixed,
            Some(Value::String(tag)) => tag.parse()?,
            Some(element @ Value::Object(_)) => {
                let schema = SchemaBuilder {
                    nodes: nodes_from_json(element)?,
                    ..SchemaBuilder::new()
                }
                .compile(false)?;
                SchemaType::Documents(Arc::new(schema))
            }
            Some(other) => {
                return Err(DocModelError::InvalidSchema(format!(
                    "unsupported array element description {other} for \"{name}\""
                )));
            }
        })),
        other => Err(DocModelError::InvalidSchema(format!(
            "unsupported description {other} for \"{name}\""
        ))),
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use serde_json::json;

    use super::*;

    fn blog_post() -> Schema {
        Schema::builder()
            .field("title", SchemaType::String)
            .nested("meta", |m| m
                .field("votes", SchemaType::Number)
                .field("published", SchemaType::Date))
            .array("tags", SchemaType::String)
            .documents("comments", |c| c
                .field("body", SchemaType::String)
                .property("_author"))
            .property("_owner")
            .build()
            .unwrap()
    }

    #[test]
    fn compiles_shape_with_null_leaves() {
        let schema = blog_post();

        assert_eq!(
            schema.shape(),
            &doc! {
                "_id": null,
                "title": null,
                "meta": { "votes": null, "published": null },
                "tags": [],
                "comments": [],
                "_owner": null,
            }
        );
        assert_eq!(
            schema.paths(),
            &["_id", "title", "meta.votes", "meta.published", "tags", "comments", "_owner"]
        );
    }

    #[test]
    fn records_arrays_namespaces_and_casters() {
        let schema = blog_post();

        assert!(schema.is_array("tags"));
        assert!(schema.is_array("comments"));
        assert!(!schema.is_array("title"));
        assert!(schema.is_namespace("meta"));
        assert!(matches!(schema.path_type("_id"), Some(SchemaType::ObjectId)));
        assert!(matches!(schema.path_type("_owner"), Some(SchemaType::ObjectId)));
        assert!(matches!(schema.path_type("meta.votes"), Some(SchemaType::Number)));
        assert!(matches!(
            schema.path_type("comments"),
            Some(SchemaType::Array(inner)) if matches!(**inner, SchemaType::Documents(_))
        ));
    }

    #[test]
    fn explicit_id_type_overrides_default() {
        let schema = Schema::builder()
            .field("_id", SchemaType::String)
            .build()
            .unwrap();

        assert!(matches!(schema.path_type("_id"), Some(SchemaType::String)));
        assert_eq!(schema.paths(), &["_id"]);
    }

    #[test]
    fn duplicate_property_is_rejected() {
        let result = Schema::builder()
            .field("name", SchemaType::String)
            .property("name")
            .build();

        assert!(matches!(result, Err(DocModelError::InvalidSchema(_))));
    }

    #[test]
    fn hooks_on_unknown_names_become_virtuals() {
        let schema = Schema::builder()
            .field("first", SchemaType::String)
            .getter("first", |v| v)
            .getter("display", |v| v)
            .build()
            .unwrap();

        assert!(schema.accessor("first").unwrap().getter.is_some());
        assert!(schema.virtual_property("display").is_some());
        assert!(schema.accessor("display").is_none());
    }

    #[test]
    fn compiles_from_json_description() {
        let schema = Schema::from_json(&json!({
            "name": "string",
            "contact": { "email": "string", "phone": null },
            "tags": ["string"],
            "matrix": [["number"]],
            "comments": [{ "body": "string", "date": "date" }],
        }))
        .unwrap();

        assert!(schema.is_namespace("contact"));
        assert!(schema.path_type("contact.phone").is_none());
        assert!(schema.is_array("tags"));
        assert!(matches!(
            schema.path_type("matrix"),
            Some(SchemaType::Array(inner)) if matches!(**inner, SchemaType::Mixed)
        ));
        assert_eq!(schema.shape().get("comments"), Some(&Bson::Array(vec![])));
    }

    #[test]
    fn unknown_json_tag_fails() {
        assert!(matches!(
            Schema::from_json(&json!({ "name": "text" })),
            Err(DocModelError::InvalidSchema(_))
        ));
    }
}

//! Fluent query construction and execution.
//!
//! A [`Query`] accumulates a condition document and a set of [`QueryOptions`] through
//! chainable calls. Operators apply to the *current path*, set with
//! [`where_path`](Query::where_path), or to an explicit path through their `*_at`
//! variant. Once bound to a [`Model`] the query can be executed; conditions are cast
//! against the model's schema right before they reach the backend.
//!
//! # Query Building
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let adults = people
//!     .query()
//!     .where_path("age").gte(18).lt(65)
//!     .where_path("tags").in_values(["admin", "staff"])
//!     .select("name email -_id")
//!     .desc(&["age"])
//!     .limit(20)
//!     .find()
//!     .await?;
//! ```
//!
//! Results can also be streamed one document at a time with [`Query::each`] or
//! [`Query::each_with_advance`].

use bson::{Bson, Document, doc};
use std::fmt::{self, Debug};
use tracing::debug;

use crate::{
    backend::{RemoveOptions, UpdateOptions},
    condition::{cast_conditions, cast_update, is_operator_map},
    cursor::{Advance, QueryCursor},
    error::{DocModelError, DocModelResult},
    instance::Instance,
    model::Model,
    page::{Page, PaginationParams},
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The numeric form used in sort documents (`1` or `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Options carried alongside the conditions of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Projection: `1` includes a field, `0` excludes it.
    pub fields: Option<Document>,
    /// Sort keys in priority order.
    pub sort: Vec<(String, i32)>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub hint: Option<Document>,
    pub batch_size: Option<u32>,
}

impl QueryOptions {
    /// The sort keys as a document, or `None` when unsorted.
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }

        Some(
            self.sort
                .iter()
                .map(|(field, direction)| (field.clone(), Bson::Int32(*direction)))
                .collect(),
        )
    }
}

/// Converts a projection description into a projection document.
///
/// A string lists space-separated field names; a `-` prefix excludes the field.
pub trait IntoProjection {
    fn into_projection(self) -> Document;
}

impl IntoProjection for Document {
    fn into_projection(self) -> Document {
        self
    }
}

impl IntoProjection for &str {
    fn into_projection(self) -> Document {
        project(self.split_whitespace())
    }
}

impl IntoProjection for String {
    fn into_projection(self) -> Document {
        project(self.split_whitespace())
    }
}

impl IntoProjection for &[&str] {
    fn into_projection(self) -> Document {
        project(self.iter().copied())
    }
}

impl IntoProjection for Vec<&str> {
    fn into_projection(self) -> Document {
        project(self.into_iter())
    }
}

impl<const N: usize> IntoProjection for [&str; N] {
    fn into_projection(self) -> Document {
        project(self.into_iter())
    }
}

fn project<'a>(fields: impl Iterator<Item = &'a str>) -> Document {
    fields
        .filter(|field| !field.is_empty())
        .map(|field| match field.strip_prefix('-') {
            Some(excluded) => (excluded.to_string(), Bson::Int32(0)),
            None => (field.to_string(), Bson::Int32(1)),
        })
        .collect()
}

/// The operation a bound query performs when executed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    Find,
    FindOne,
    Count,
    Update {
        changes: Document,
        options: UpdateOptions,
    },
    Remove,
}

impl QueryOp {
    pub fn name(&self) -> &'static str {
        match self {
            QueryOp::Find => "find",
            QueryOp::FindOne => "findOne",
            QueryOp::Count => "count",
            QueryOp::Update { .. } => "update",
            QueryOp::Remove => "remove",
        }
    }
}

/// The result of [`Query::exec`].
#[derive(Debug)]
pub enum QueryOutput {
    Instances(Vec<Instance>),
    /// Raw documents, returned when hydration is disabled.
    Documents(Vec<Document>),
    Instance(Option<Instance>),
    Count(u64),
    /// The backend acknowledgement of a write.
    Ack(Document),
}

/// A chainable query.
///
/// Every builder method consumes and returns the query; cloning a query yields an
/// independent copy.
#[derive(Clone)]
pub struct Query {
    conditions: Document,
    options: QueryOptions,
    hydrate: bool,
    current_path: Option<String>,
    model: Option<Model>,
    op: Option<QueryOp>,
    invalid: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            conditions: Document::new(),
            options: QueryOptions::default(),
            hydrate: true,
            current_path: None,
            model: None,
            op: None,
            invalid: None,
        }
    }
}

macro_rules! operator {
    ($(#[$meta:meta])* $name:ident, $name_at:ident, $op:literal, |$arg:ident: $ty:ty| $value:expr) => {
        $(#[$meta])*
        pub fn $name(self, $arg: $ty) -> Self {
            let value = $value;
            self.apply(None, $op, value)
        }

        #[doc = concat!("Like [`", stringify!($name), "`](Self::", stringify!($name), ") on an explicit path.")]
        pub fn $name_at(self, path: impl Into<String>, $arg: $ty) -> Self {
            let value = $value;
            self.apply(Some(path.into()), $op, value)
        }
    };
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `conditions` into this query.
    ///
    /// Operator maps on the same path are combined; any other value replaces the
    /// existing condition.
    pub fn with_conditions(self, conditions: Document) -> Self {
        let mut query = self;
        for (path, value) in conditions {
            query.merge_condition(path, value);
        }
        query
    }

    pub fn conditions(&self) -> &Document {
        &self.conditions
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn op(&self) -> Option<&QueryOp> {
        self.op.as_ref()
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn is_hydrating(&self) -> bool {
        self.hydrate
    }

    /// Binds this query to a model and the operation `exec` will perform.
    pub fn bind(mut self, model: Model, op: QueryOp) -> Self {
        self.model = Some(model);
        self.op = Some(op);
        self
    }

    /// Sets the path subsequent operators apply to.
    pub fn where_path(mut self, path: impl Into<String>) -> Self {
        self.current_path = Some(path.into());
        self
    }

    /// Adds an equality condition on `path` and makes it the current path.
    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        let path = path.into();
        self.conditions.insert(path.clone(), value.into());
        self.current_path = Some(path);
        self
    }

    /// Adds an equality condition on the current path.
    pub fn eq(self, value: impl Into<Bson>) -> Self {
        match self.current_path.clone() {
            Some(path) => self.where_eq(path, value),
            None => self.invalidate("eq"),
        }
    }

    operator!(
        /// Matches values greater than `value`.
        gt, gt_at, "$gt", |value: impl Into<Bson>| value.into()
    );
    operator!(
        /// Matches values greater than or equal to `value`.
        gte, gte_at, "$gte", |value: impl Into<Bson>| value.into()
    );
    operator!(
        /// Matches values less than `value`.
        lt, lt_at, "$lt", |value: impl Into<Bson>| value.into()
    );
    operator!(
        /// Matches values less than or equal to `value`.
        lte, lte_at, "$lte", |value: impl Into<Bson>| value.into()
    );
    operator!(
        /// Matches values not equal to `value`.
        ne, ne_at, "$ne", |value: impl Into<Bson>| value.into()
    );
    operator!(
        /// Matches any of `values`.
        in_values, in_values_at, "$in", |values: impl IntoIterator<Item = impl Into<Bson>>| list(values)
    );
    operator!(
        /// Matches none of `values`.
        nin, nin_at, "$nin", |values: impl IntoIterator<Item = impl Into<Bson>>| list(values)
    );
    operator!(
        /// Matches arrays containing all of `values`.
        all, all_at, "$all", |values: impl IntoIterator<Item = impl Into<Bson>>| list(values)
    );
    operator!(
        /// Matches arrays of exactly `len` elements.
        size, size_at, "$size", |len: i64| Bson::Int64(len)
    );
    operator!(
        /// Matches fields that exist (or not).
        exists, exists_at, "$exists", |exists: bool| Bson::Boolean(exists)
    );
    operator!(
        /// Matches arrays with at least one element satisfying `conditions`.
        elem_match, elem_match_at, "$elemMatch", |conditions: Document| Bson::Document(conditions)
    );
    operator!(
        /// Sorts by proximity to `point` (`[x, y]`).
        near, near_at, "$near", |point: [f64; 2]| coordinates(point)
    );
    operator!(
        /// Limits a `near` search to `distance`.
        max_distance, max_distance_at, "$maxDistance", |distance: f64| Bson::Double(distance)
    );

    /// Matches values where `value % divisor == remainder`.
    pub fn modulo(self, divisor: i64, remainder: i64) -> Self {
        self.apply(None, "$mod", Bson::Array(vec![divisor.into(), remainder.into()]))
    }

    pub fn modulo_at(self, path: impl Into<String>, divisor: i64, remainder: i64) -> Self {
        self.apply(Some(path.into()), "$mod", Bson::Array(vec![divisor.into(), remainder.into()]))
    }

    /// Matches points inside the box spanned by two corners.
    pub fn within_box(self, lower_left: [f64; 2], upper_right: [f64; 2]) -> Self {
        let shape = doc! { "$box": [coordinates(lower_left), coordinates(upper_right)] };
        self.apply(None, "$within", Bson::Document(shape))
    }

    /// Matches points inside the circle of `radius` around `center`.
    pub fn within_center(self, center: [f64; 2], radius: f64) -> Self {
        let shape = doc! { "$center": [coordinates(center), radius] };
        self.apply(None, "$within", Bson::Document(shape))
    }

    /// Adds alternative condition sets; a document matches if any of them match.
    pub fn or(mut self, alternatives: impl IntoIterator<Item = Document>) -> Self {
        let mut branches = match self.conditions.remove("$or") {
            Some(Bson::Array(existing)) => existing,
            _ => Vec::new(),
        };
        branches.extend(alternatives.into_iter().map(Bson::Document));

        self.conditions.insert("$or", branches);
        self
    }

    /// Adds a server-side JavaScript predicate.
    pub fn js_where(mut self, code: impl Into<String>) -> Self {
        self.conditions.insert("$where", Bson::String(code.into()));
        self
    }

    /// Merges a projection; later calls win for the same field.
    pub fn select(mut self, fields: impl IntoProjection) -> Self {
        let projection = self.options.fields.get_or_insert_with(Document::new);
        for (field, include) in fields.into_projection() {
            projection.insert(field, include);
        }
        self
    }

    /// Alias of [`select`](Self::select).
    pub fn fields(self, fields: impl IntoProjection) -> Self {
        self.select(fields)
    }

    /// Includes only the named fields.
    pub fn only<'a>(self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        let projection = fields
            .into_iter()
            .map(|field| (field.to_string(), Bson::Int32(1)))
            .collect::<Document>();
        self.select(projection)
    }

    /// Excludes the named fields.
    pub fn exclude<'a>(self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        let projection = fields
            .into_iter()
            .map(|field| (field.to_string(), Bson::Int32(0)))
            .collect::<Document>();
        self.select(projection)
    }

    /// Adds a sort key. Sorting again on the same field replaces its direction.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        let direction = direction.as_i32();

        match self.options.sort.iter_mut().find(|(existing, _)| *existing == field) {
            Some(entry) => entry.1 = direction,
            None => self.options.sort.push((field, direction)),
        }
        self
    }

    pub fn asc(self, fields: &[&str]) -> Self {
        fields
            .iter()
            .fold(self, |query, field| query.sort(*field, SortDirection::Asc))
    }

    pub fn desc(self, fields: &[&str]) -> Self {
        fields
            .iter()
            .fold(self, |query, field| query.sort(*field, SortDirection::Desc))
    }

    /// Sorts by a space-separated list of fields; a `-` prefix sorts descending.
    pub fn sort_by(self, spec: &str) -> Self {
        spec.split_whitespace().fold(self, |query, field| match field.strip_prefix('-') {
            Some(field) => query.sort(field, SortDirection::Desc),
            None => query.sort(field, SortDirection::Asc),
        })
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    pub fn hint(mut self, hint: Document) -> Self {
        self.options.hint = Some(hint);
        self
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    /// Whether `exec` hydrates found documents into instances.
    pub fn hydrate(mut self, hydrate: bool) -> Self {
        self.hydrate = hydrate;
        self
    }

    /// Restricts the query to one page of results.
    pub fn paginate(self, params: PaginationParams) -> Self {
        let per_page = i64::try_from(params.per_page).unwrap_or(i64::MAX);
        self.skip(params.offset()).limit(per_page)
    }

    /// Applies the named scope registered on the bound model's schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Query`] when the query is unbound, the scope does not
    /// exist, or it takes arguments.
    pub fn scope(self, name: &str) -> DocModelResult<Self> {
        self.scope_with(name, &[])
    }

    /// Applies the named scope with arguments.
    pub fn scope_with(self, name: &str, args: &[Bson]) -> DocModelResult<Self> {
        let model = self.bound_model()?;
        let scope = model
            .schema()
            .scope(name)
            .cloned()
            .ok_or_else(|| DocModelError::Query(format!("unknown scope \"{name}\"")))?;

        scope.apply(name, self, args)
    }

    /// Runs the bound operation.
    ///
    /// An unbound operation defaults to [`QueryOp::Find`].
    pub async fn exec(self) -> DocModelResult<QueryOutput> {
        match self.op.clone().unwrap_or(QueryOp::Find) {
            QueryOp::Find if self.hydrate => Ok(QueryOutput::Instances(self.find().await?)),
            QueryOp::Find => Ok(QueryOutput::Documents(self.find_raw().await?)),
            QueryOp::FindOne => Ok(QueryOutput::Instance(self.find_one().await?)),
            QueryOp::Count => Ok(QueryOutput::Count(self.count().await?)),
            QueryOp::Update { changes, options } => {
                Ok(QueryOutput::Ack(self.update_with(changes, options).await?))
            }
            QueryOp::Remove => Ok(QueryOutput::Ack(self.remove().await?)),
        }
    }

    /// Finds every matching document and hydrates it.
    pub async fn find(self) -> DocModelResult<Vec<Instance>> {
        let model = self.bound_model()?;

        Ok(self
            .find_raw()
            .await?
            .into_iter()
            .map(|doc| model.hydrate(doc))
            .collect())
    }

    /// Finds every matching document without hydration.
    pub async fn find_raw(self) -> DocModelResult<Vec<Document>> {
        let (model, conditions) = self.prepare("find")?;

        let mut cursor = model
            .collection()
            .find(conditions, self.options)
            .await?;
        cursor.to_array().await
    }

    /// Finds the first matching document.
    pub async fn find_one(self) -> DocModelResult<Option<Instance>> {
        let (model, conditions) = self.prepare("findOne")?;

        let found = model
            .collection()
            .find_one(conditions, self.options)
            .await?;
        Ok(found.map(|doc| model.hydrate(doc)))
    }

    /// Counts matching documents. Options other than the conditions are ignored.
    pub async fn count(self) -> DocModelResult<u64> {
        let (model, conditions) = self.prepare("count")?;

        model.collection().count(conditions).await
    }

    /// Applies `changes` to the first matching document.
    pub async fn update(self, changes: Document) -> DocModelResult<Document> {
        self.update_with(changes, UpdateOptions::default()).await
    }

    /// Applies `changes` to matching documents.
    ///
    /// A change document without update operators is treated as a `$set` payload.
    pub async fn update_with(self, changes: Document, options: UpdateOptions) -> DocModelResult<Document> {
        let (model, conditions) = self.prepare("update")?;
        let changes = cast_update(model.schema(), changes)?;

        model
            .collection()
            .update(conditions, changes, options)
            .await
    }

    /// Removes every matching document.
    pub async fn remove(self) -> DocModelResult<Document> {
        let (model, conditions) = self.prepare("remove")?;

        model
            .collection()
            .remove(conditions, RemoveOptions::default())
            .await
    }

    /// Fetches one page of matching documents along with the total count.
    pub async fn page(self, params: PaginationParams) -> DocModelResult<Page<Instance>> {
        let count = self.clone().count().await?;
        let items = self.paginate(params).find().await?;

        Ok(params.page_of(items, count))
    }

    /// Opens a cursor over the matching documents.
    pub async fn stream(self) -> DocModelResult<QueryCursor> {
        let (model, conditions) = self.prepare("stream")?;

        let cursor = model
            .collection()
            .find(conditions, self.options)
            .await?;
        Ok(QueryCursor::new(cursor, model))
    }

    /// Streams matching documents to `consumer`, advancing automatically.
    ///
    /// See [`QueryCursor::each`].
    pub async fn each<F>(self, consumer: F) -> DocModelResult<()>
    where
        F: FnMut(Option<Instance>) + Send,
    {
        let mut cursor = self.stream().await?;
        cursor.each(consumer).await
    }

    /// Streams matching documents to `consumer`, which decides when to advance.
    ///
    /// See [`QueryCursor::each_with_advance`].
    pub async fn each_with_advance<F>(self, consumer: F) -> DocModelResult<()>
    where
        F: FnMut(Option<Instance>, Advance) + Send,
    {
        let mut cursor = self.stream().await?;
        cursor.each_with_advance(consumer).await
    }

    fn bound_model(&self) -> DocModelResult<Model> {
        self.model
            .clone()
            .ok_or_else(|| DocModelError::Query("query is not bound to a model".to_string()))
    }

    fn prepare(&self, verb: &str) -> DocModelResult<(Model, Document)> {
        if let Some(reason) = &self.invalid {
            return Err(DocModelError::Query(reason.clone()));
        }

        let model = self.bound_model()?;
        let conditions = cast_conditions(model.schema(), self.conditions.clone())?;
        debug!(model = %model.name(), verb, conditions = %conditions, "executing query");

        Ok((model, conditions))
    }

    fn apply(mut self, path: Option<String>, op: &str, value: Bson) -> Self {
        let Some(path) = path.or_else(|| self.current_path.clone()) else {
            return self.invalidate(op);
        };

        match self.conditions.get_mut(&path) {
            Some(Bson::Document(operators)) if is_operator_map(operators) => {
                operators.insert(op, value);
            }
            _ => {
                let mut operators = Document::new();
                operators.insert(op, value);
                self.conditions.insert(path, operators);
            }
        }
        self
    }

    fn merge_condition(&mut self, path: String, value: Bson) {
        if path == "$or" {
            if let Bson::Array(alternatives) = value {
                let alternatives = alternatives.into_iter().filter_map(|alt| match alt {
                    Bson::Document(doc) => Some(doc),
                    _ => None,
                });
                *self = std::mem::take(self).or(alternatives);
            }
            return;
        }

        if let (Some(Bson::Document(existing)), Bson::Document(incoming)) =
            (self.conditions.get_mut(&path), &value)
            && is_operator_map(existing)
            && is_operator_map(incoming)
        {
            for (op, operand) in incoming {
                existing.insert(op.clone(), operand.clone());
            }
            return;
        }

        self.conditions.insert(path, value);
    }

    fn invalidate(mut self, op: &str) -> Self {
        self.invalid
            .get_or_insert_with(|| format!("{op} needs a path; call where_path first"));
        self
    }
}

impl Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("conditions", &self.conditions)
            .field("options", &self.options)
            .field("hydrate", &self.hydrate)
            .field("current_path", &self.current_path)
            .field("model", &self.model.as_ref().map(Model::name))
            .field("op", &self.op)
            .finish()
    }
}

fn list(values: impl IntoIterator<Item = impl Into<Bson>>) -> Bson {
    Bson::Array(values.into_iter().map(Into::into).collect())
}

fn coordinates([x, y]: [f64; 2]) -> Bson {
    Bson::Array(vec![Bson::Double(x), Bson::Double(y)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_accumulate_on_the_current_path() {
        let query = Query::new().where_path("age").gte(18).lt(65);

        assert_eq!(query.conditions(), &doc! { "age": { "$gte": 18, "$lt": 65 } });
    }

    #[test]
    fn explicit_path_variants_leave_current_path_alone() {
        let query = Query::new()
            .where_path("age")
            .gt_at("score", 10)
            .ne("x");

        assert_eq!(query.current_path(), Some("age"));
        assert_eq!(query.conditions(), &doc! { "score": { "$gt": 10 }, "age": { "$ne": "x" } });
    }

    #[test]
    fn operator_without_path_invalidates_query() {
        let query = Query::new().gt(5);

        assert!(query.invalid.is_some());
        assert!(query.conditions().is_empty());
    }

    #[test]
    fn equality_replaces_operators() {
        let query = Query::new().where_path("name").ne("a").eq("b");

        assert_eq!(query.conditions(), &doc! { "name": "b" });
    }

    #[test]
    fn list_and_geo_operators() {
        let query = Query::new()
            .where_path("tags").in_values(["a", "b"]).nin(["c"])
            .where_path("loc").near([1.0, 2.0]).max_distance(5.0)
            .modulo_at("n", 4, 1)
            .size_at("tags", 2);

        assert_eq!(
            query.conditions(),
            &doc! {
                "tags": { "$in": ["a", "b"], "$nin": ["c"], "$size": 2_i64 },
                "loc": { "$near": [1.0, 2.0], "$maxDistance": 5.0 },
                "n": { "$mod": [4_i64, 1_i64] },
            }
        );
    }

    #[test]
    fn within_shapes() {
        let query = Query::new()
            .where_path("loc")
            .within_box([0.0, 0.0], [1.0, 1.0]);

        assert_eq!(
            query.conditions(),
            &doc! { "loc": { "$within": { "$box": [[0.0, 0.0], [1.0, 1.0]] } } }
        );
    }

    #[test]
    fn or_appends_alternatives() {
        let query = Query::new()
            .or([doc! { "a": 1 }])
            .or([doc! { "b": 2 }]);

        assert_eq!(query.conditions(), &doc! { "$or": [{ "a": 1 }, { "b": 2 }] });
    }

    #[test]
    fn with_conditions_merges_operator_maps() {
        let query = Query::new()
            .where_path("age").gte(18)
            .with_conditions(doc! { "age": { "$lt": 30 }, "name": "x" });

        assert_eq!(query.conditions(), &doc! { "age": { "$gte": 18, "$lt": 30 }, "name": "x" });
    }

    #[test]
    fn projection_strings_lists_and_overrides() {
        let query = Query::new()
            .select("name email -_id")
            .exclude(["email"]);

        assert_eq!(
            query.options().fields,
            Some(doc! { "name": 1, "email": 0, "_id": 0 })
        );

        let listed = Query::new().select(["a", "b"]);
        assert_eq!(listed.options().fields, Some(doc! { "a": 1, "b": 1 }));
    }

    #[test]
    fn sort_keeps_priority_and_replaces_direction() {
        let query = Query::new()
            .asc(&["name"])
            .sort_by("-age created")
            .desc(&["name"]);

        assert_eq!(
            query.options().sort_document(),
            Some(doc! { "name": -1, "age": -1, "created": 1 })
        );
    }

    #[test]
    fn paginate_sets_skip_and_limit() {
        let query = Query::new().paginate(PaginationParams::new(3, 25));

        assert_eq!(query.options().skip, Some(50));
        assert_eq!(query.options().limit, Some(25));
    }

    #[test]
    fn clones_are_independent() {
        let base = Query::new().where_eq("kind", "post");
        let narrowed = base.clone().where_path("votes").gt(3);

        assert_eq!(base.conditions(), &doc! { "kind": "post" });
        assert_eq!(narrowed.conditions().len(), 2);
    }

    #[tokio::test]
    async fn unbound_query_cannot_execute() {
        let err = Query::new().find_raw().await.unwrap_err();

        assert!(matches!(err, DocModelError::Query(_)));
    }
}

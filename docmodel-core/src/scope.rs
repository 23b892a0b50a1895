//! Named query scopes.
//!
//! A scope is a reusable query fragment registered on a schema under a name. It can be
//! a fixed set of conditions or a function over the query being built; function scopes
//! may take arguments, either a fixed number or any number.
//!
//! ```ignore
//! let schema = Schema::builder()
//!     .field("age", SchemaType::Number)
//!     .scope("adults", Scope::conditions(doc! { "age": { "$gte": 18 } }))
//!     .scope("older_than", Scope::fixed(1, |q, args| q.where_path("age").gt(args[0].clone())))
//!     .build()?;
//!
//! let adults = people.scope("adults")?.find().await?;
//! ```

use bson::{Bson, Document};
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    error::{DocModelError, DocModelResult},
    query::Query,
};

/// A scope body that takes no arguments.
pub type ScopeBlock = Arc<dyn Fn(Query) -> Query + Send + Sync>;
/// A scope body that takes arguments.
pub type ScopeArgsBlock = Arc<dyn Fn(Query, &[Bson]) -> Query + Send + Sync>;

/// A named, reusable query fragment.
#[derive(Clone)]
pub enum Scope {
    /// Conditions merged into the query.
    Conditions(Document),
    /// A function applied to the query, taking no arguments.
    Block(ScopeBlock),
    /// A function taking exactly `arity` arguments.
    Fixed { arity: usize, block: ScopeArgsBlock },
    /// A function taking any number of arguments.
    Variadic(ScopeArgsBlock),
}

impl Scope {
    pub fn conditions(conditions: Document) -> Self {
        Scope::Conditions(conditions)
    }

    pub fn block<F>(block: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        Scope::Block(Arc::new(block))
    }

    pub fn fixed<F>(arity: usize, block: F) -> Self
    where
        F: Fn(Query, &[Bson]) -> Query + Send + Sync + 'static,
    {
        Scope::Fixed {
            arity,
            block: Arc::new(block),
        }
    }

    pub fn variadic<F>(block: F) -> Self
    where
        F: Fn(Query, &[Bson]) -> Query + Send + Sync + 'static,
    {
        Scope::Variadic(Arc::new(block))
    }

    /// The number of arguments this scope takes, or `None` when it takes any number.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Scope::Conditions(_) | Scope::Block(_) => Some(0),
            Scope::Fixed { arity, .. } => Some(*arity),
            Scope::Variadic(_) => None,
        }
    }

    /// Applies this scope to `query`.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Query`] when the number of arguments does not match.
    pub fn apply(&self, name: &str, query: Query, args: &[Bson]) -> DocModelResult<Query> {
        if let Some(arity) = self.arity()
            && arity != args.len()
        {
            return Err(DocModelError::Query(format!(
                "scope \"{name}\" takes {arity} argument(s), got {}",
                args.len()
            )));
        }

        Ok(match self {
            Scope::Conditions(conditions) => query.with_conditions(conditions.clone()),
            Scope::Block(block) => block(query),
            Scope::Fixed { block, .. } | Scope::Variadic(block) => block(query, args),
        })
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Conditions(conditions) => f.debug_tuple("Conditions").field(conditions).finish(),
            Scope::Block(_) => f.write_str("Block"),
            Scope::Fixed { arity, .. } => f.debug_struct("Fixed").field("arity", arity).finish_non_exhaustive(),
            Scope::Variadic(_) => f.write_str("Variadic"),
        }
    }
}

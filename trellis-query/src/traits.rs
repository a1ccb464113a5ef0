//! The storage boundary the loaders read through.
//!
//! Everything above this trait (loaders, priming, resolution) is
//! storage-agnostic. [`crate::store::MemoryStore`] is the bundled
//! implementation used by tests and demos.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use trellis_schema::{Edge, EdgeSet, Entity, EntityKey, EntityKind, Id, Subscription};

use crate::error::QueryResult;

/// A boxed future type for object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which rows a bulk read returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every row of the entity type.
    All,
    /// Rows whose primary key is in the list.
    KeyIn(Vec<EntityKey>),
    /// Rows whose key-valued column `field` is in the list.
    FieldIn {
        /// Column name, e.g. `authorId`.
        field: &'static str,
        /// Accepted values.
        keys: Vec<Id>,
    },
}

impl Predicate {
    /// Build a primary-key predicate from anything convertible to a key.
    pub fn key_in<K: Into<EntityKey>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self::KeyIn(keys.into_iter().map(Into::into).collect())
    }

    /// Build a foreign-key predicate.
    pub fn field_in(field: &'static str, keys: impl IntoIterator<Item = Id>) -> Self {
        Self::FieldIn {
            field,
            keys: keys.into_iter().collect(),
        }
    }

    /// Check whether a row satisfies the predicate.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::All => true,
            Self::KeyIn(keys) => entity.key().is_some_and(|key| keys.contains(&key)),
            Self::FieldIn { field, keys } => entity
                .key_field(field)
                .and_then(|key| key.as_id())
                .is_some_and(|id| keys.contains(&id)),
        }
    }
}

/// A fetched row, optionally carrying the rows of joined edges.
///
/// For an edge whose link is the target itself (posts, profile) the joined
/// rows are target rows. For subscription edges they are link rows; the
/// related id sits in the edge's `related_key` column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The row itself.
    pub entity: Entity,
    /// Rows joined in by edge. An edge that was requested but matched
    /// nothing maps to an empty list.
    pub joined: IndexMap<Edge, Vec<Entity>>,
}

impl Row {
    /// Create a row with no joins.
    pub fn new(entity: impl Into<Entity>) -> Self {
        Self {
            entity: entity.into(),
            joined: IndexMap::new(),
        }
    }

    /// Attach the rows of a joined edge.
    pub fn with_join(mut self, edge: Edge, rows: Vec<Entity>) -> Self {
        self.joined.insert(edge, rows);
        self
    }

    /// Rows joined for an edge, if that edge was joined.
    pub fn joined(&self, edge: Edge) -> Option<&[Entity]> {
        self.joined.get(&edge).map(Vec::as_slice)
    }
}

/// Bulk-capable storage.
///
/// Reads take a predicate and an (often empty) set of edges to join.
/// Writes back the mutation surface. Implementations report absent rows as
/// `Ok(None)`/`Ok(false)` and reserve `Err` for failures of the storage itself.
pub trait Store: Send + Sync + 'static {
    /// Fetch every row of `kind` matching `predicate`, joining `joins`.
    fn find_many<'a>(
        &'a self,
        kind: EntityKind,
        predicate: Predicate,
        joins: &'a EdgeSet,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>>;

    /// Fetch one row by primary key.
    fn find_unique<'a>(
        &'a self,
        kind: EntityKind,
        key: EntityKey,
    ) -> BoxFuture<'a, QueryResult<Option<Row>>>;

    /// Insert a new row and return it as stored.
    fn insert<'a>(&'a self, entity: Entity) -> BoxFuture<'a, QueryResult<Entity>>;

    /// Apply a camelCase column patch to a row. `Ok(None)` when the row is absent.
    fn update<'a>(
        &'a self,
        kind: EntityKind,
        key: EntityKey,
        patch: Map<String, Value>,
    ) -> BoxFuture<'a, QueryResult<Option<Entity>>>;

    /// Delete a row by primary key. `Ok(false)` when nothing was deleted.
    fn delete<'a>(&'a self, kind: EntityKind, key: EntityKey) -> BoxFuture<'a, QueryResult<bool>>;

    /// Delete a subscription link. `Ok(false)` when the link did not exist.
    fn delete_subscription<'a>(
        &'a self,
        subscription: Subscription,
    ) -> BoxFuture<'a, QueryResult<bool>>;

    /// A short name for logs.
    fn name(&self) -> &'static str {
        "store"
    }
}

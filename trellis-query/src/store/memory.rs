//! In-memory store.
//!
//! Rows live in per-kind tables behind a [`parking_lot::RwLock`]. Every call
//! is appended to a log so tests can assert exactly which bulk reads a
//! request issued, and reads can be made to fail per entity kind.
//!
//! # Example
//!
//! ```rust
//! use trellis_query::store::MemoryStore;
//! use trellis_schema::{EntityKind, User};
//! use uuid::Uuid;
//!
//! let store = MemoryStore::new();
//! store.put(User { id: Uuid::new_v4(), name: "ann".into(), balance: 10.0 });
//!
//! assert_eq!(store.len(EntityKind::User), 1);
//! assert!(store.calls().is_empty());
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::trace;
use trellis_schema::{Edge, EdgeSet, Entity, EntityKey, EntityKind, Subscription};

use crate::error::{QueryError, QueryResult};
use crate::traits::{BoxFuture, Predicate, Row, Store};

/// One logged store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    /// A bulk read.
    FindMany {
        /// Entity type read.
        kind: EntityKind,
        /// Row filter.
        predicate: Predicate,
        /// Joined edges.
        joins: EdgeSet,
    },
    /// A single-row read.
    FindUnique {
        /// Entity type read.
        kind: EntityKind,
        /// Primary key.
        key: EntityKey,
    },
    /// An insert.
    Insert {
        /// Entity type written.
        kind: EntityKind,
    },
    /// A patch.
    Update {
        /// Entity type written.
        kind: EntityKind,
        /// Primary key.
        key: EntityKey,
    },
    /// A delete.
    Delete {
        /// Entity type written.
        kind: EntityKind,
    },
}

impl StoreCall {
    /// Entity type touched by the call.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::FindMany { kind, .. }
            | Self::FindUnique { kind, .. }
            | Self::Insert { kind }
            | Self::Update { kind, .. }
            | Self::Delete { kind } => *kind,
        }
    }

    /// Check if this is a read.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::FindMany { .. } | Self::FindUnique { .. })
    }
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<EntityKind, Vec<Entity>>>,
    calls: Mutex<Vec<StoreCall>>,
    failures: RwLock<HashMap<EntityKind, QueryError>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row without logging a call. Intended for seeding.
    pub fn put(&self, entity: impl Into<Entity>) {
        let entity = entity.into();
        let mut tables = self.tables.write();
        let table = tables.entry(entity.kind()).or_default();
        let existing = table.iter().position(|row| same_row(row, &entity));
        match existing {
            Some(index) => table[index] = entity,
            None => table.push(entity),
        }
    }

    /// Seeding helper for chained construction.
    pub fn with(self, entity: impl Into<Entity>) -> Self {
        self.put(entity);
        self
    }

    /// Number of rows of a kind.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.tables.read().get(&kind).map_or(0, Vec::len)
    }

    /// Check if a kind has no rows.
    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    /// Snapshot of every logged call, oldest first.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Bulk reads of one entity type.
    pub fn find_many_calls(&self, kind: EntityKind) -> Vec<StoreCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, StoreCall::FindMany { kind: k, .. } if *k == kind))
            .cloned()
            .collect()
    }

    /// Number of reads of any shape.
    pub fn read_count(&self) -> usize {
        self.calls.lock().iter().filter(|call| call.is_read()).count()
    }

    /// Forget the call log.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make every read touching `kind` fail with `error` until cleared.
    pub fn fail_reads(&self, kind: EntityKind, error: QueryError) {
        self.failures.write().insert(kind, error);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    fn record(&self, call: StoreCall) {
        trace!(store = "memory", ?call, "store call");
        self.calls.lock().push(call);
    }

    fn check_failure(&self, kind: EntityKind) -> QueryResult<()> {
        match self.failures.read().get(&kind) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn read_rows(
        &self,
        kind: EntityKind,
        predicate: &Predicate,
        joins: &EdgeSet,
    ) -> QueryResult<Vec<Row>> {
        self.check_failure(kind)?;
        for edge in joins {
            let spec = edge.spec();
            if spec.source != kind || !spec.joinable {
                return Err(QueryError::invalid_argument(
                    "joins",
                    format!("{} cannot be joined from {}", edge, kind),
                ));
            }
            self.check_failure(spec.link)?;
        }

        let tables = self.tables.read();
        let empty = Vec::new();
        let rows = tables.get(&kind).unwrap_or(&empty);

        Ok(rows
            .iter()
            .filter(|entity| predicate.matches(entity))
            .map(|entity| {
                let mut row = Row::new(entity.clone());
                for edge in joins {
                    row.joined.insert(edge, joined_rows(&tables, edge, entity));
                }
                row
            })
            .collect())
    }

    fn write_row(&self, entity: Entity) -> QueryResult<Entity> {
        let mut tables = self.tables.write();
        let kind = entity.kind();

        let table = tables.entry(kind).or_default();
        if table.iter().any(|row| same_row(row, &entity)) {
            let field = if kind == EntityKind::Subscription {
                "subscriberId_authorId"
            } else {
                "id"
            };
            return Err(QueryError::unique_violation(kind.name(), field));
        }
        if let Entity::Profile(profile) = &entity {
            let taken = table
                .iter()
                .any(|row| matches!(row, Entity::Profile(p) if p.user_id == profile.user_id));
            if taken {
                return Err(QueryError::unique_violation(kind.name(), "userId"));
            }
        }

        table.push(entity.clone());
        Ok(entity)
    }

    fn patch_row(
        &self,
        kind: EntityKind,
        key: EntityKey,
        patch: Map<String, Value>,
    ) -> QueryResult<Option<Entity>> {
        let mut tables = self.tables.write();
        let Some(slot) = tables
            .get_mut(&kind)
            .and_then(|table| table.iter_mut().find(|row| row.key() == Some(key)))
        else {
            return Ok(None);
        };

        let updated = apply_patch(slot, patch)?;
        *slot = updated.clone();
        Ok(Some(updated))
    }

    fn remove_row(&self, kind: EntityKind, key: EntityKey) -> bool {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(&kind) else {
            return false;
        };
        let before = table.len();
        table.retain(|row| row.key() != Some(key));
        if table.len() == before {
            return false;
        }

        // Rows hanging off a deleted user go with it.
        if let (EntityKind::User, Some(id)) = (kind, key.as_id()) {
            let owned = |row: &Entity| match row {
                Entity::Post(p) => p.author_id == id,
                Entity::Profile(p) => p.user_id == id,
                Entity::Subscription(s) => s.subscriber_id == id || s.author_id == id,
                _ => false,
            };
            for dependent in [EntityKind::Post, EntityKind::Profile, EntityKind::Subscription] {
                if let Some(rows) = tables.get_mut(&dependent) {
                    rows.retain(|row| !owned(row));
                }
            }
        }
        true
    }
}

impl Store for MemoryStore {
    fn find_many<'a>(
        &'a self,
        kind: EntityKind,
        predicate: Predicate,
        joins: &'a EdgeSet,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        Box::pin(async move {
            self.record(StoreCall::FindMany {
                kind,
                predicate: predicate.clone(),
                joins: joins.clone(),
            });
            self.read_rows(kind, &predicate, joins)
        })
    }

    fn find_unique<'a>(
        &'a self,
        kind: EntityKind,
        key: EntityKey,
    ) -> BoxFuture<'a, QueryResult<Option<Row>>> {
        Box::pin(async move {
            self.record(StoreCall::FindUnique { kind, key });
            let rows = self.read_rows(kind, &Predicate::KeyIn(vec![key]), &EdgeSet::new())?;
            Ok(rows.into_iter().next())
        })
    }

    fn insert<'a>(&'a self, entity: Entity) -> BoxFuture<'a, QueryResult<Entity>> {
        Box::pin(async move {
            self.record(StoreCall::Insert {
                kind: entity.kind(),
            });
            self.write_row(entity)
        })
    }

    fn update<'a>(
        &'a self,
        kind: EntityKind,
        key: EntityKey,
        patch: Map<String, Value>,
    ) -> BoxFuture<'a, QueryResult<Option<Entity>>> {
        Box::pin(async move {
            self.record(StoreCall::Update { kind, key });
            self.patch_row(kind, key, patch)
        })
    }

    fn delete<'a>(&'a self, kind: EntityKind, key: EntityKey) -> BoxFuture<'a, QueryResult<bool>> {
        Box::pin(async move {
            self.record(StoreCall::Delete { kind });
            Ok(self.remove_row(kind, key))
        })
    }

    fn delete_subscription<'a>(
        &'a self,
        subscription: Subscription,
    ) -> BoxFuture<'a, QueryResult<bool>> {
        Box::pin(async move {
            self.record(StoreCall::Delete {
                kind: EntityKind::Subscription,
            });
            let mut tables = self.tables.write();
            let Some(links) = tables.get_mut(&EntityKind::Subscription) else {
                return Ok(false);
            };
            let before = links.len();
            links.retain(|row| !matches!(row, Entity::Subscription(s) if *s == subscription));
            Ok(links.len() != before)
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Rows of `edge`'s link table whose foreign key points at `parent`.
fn joined_rows(
    tables: &HashMap<EntityKind, Vec<Entity>>,
    edge: Edge,
    parent: &Entity,
) -> Vec<Entity> {
    let spec = edge.spec();
    let Some(parent_key) = parent.key() else {
        return Vec::new();
    };
    tables
        .get(&spec.link)
        .map(|rows| {
            rows.iter()
                .filter(|row| row.key_field(spec.foreign_key) == Some(parent_key))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn same_row(a: &Entity, b: &Entity) -> bool {
    match (a, b) {
        (Entity::Subscription(x), Entity::Subscription(y)) => x == y,
        _ => a.kind() == b.kind() && a.key().is_some() && a.key() == b.key(),
    }
}

/// Merge a camelCase patch into a row. The primary key is never patched.
fn apply_patch(entity: &Entity, patch: Map<String, Value>) -> QueryResult<Entity> {
    fn merge<T>(row: &T, patch: Map<String, Value>) -> QueryResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut value =
            serde_json::to_value(row).map_err(|e| QueryError::internal(e.to_string()))?;
        if let Value::Object(columns) = &mut value {
            for (column, new_value) in patch {
                if column != "id" && columns.contains_key(&column) {
                    columns.insert(column, new_value);
                }
            }
        }
        serde_json::from_value(value)
            .map_err(|e| QueryError::invalid_argument("patch", e.to_string()))
    }

    Ok(match entity {
        Entity::User(row) => Entity::User(merge(row, patch)?),
        Entity::Post(row) => Entity::Post(merge(row, patch)?),
        Entity::Profile(row) => Entity::Profile(merge(row, patch)?),
        Entity::MemberType(row) => Entity::MemberType(merge(row, patch)?),
        Entity::Subscription(_) => {
            return Err(QueryError::invalid_argument(
                "patch",
                "subscriptions cannot be patched",
            ));
        }
    })
}

/// Group rows by their primary key, keeping first-seen order.
pub(crate) fn index_by_key(rows: Vec<Row>) -> IndexMap<EntityKey, Row> {
    rows.into_iter()
        .filter_map(|row| row.entity.key().map(|key| (key, row)))
        .collect()
}

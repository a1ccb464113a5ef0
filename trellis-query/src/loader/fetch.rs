//! Bulk fetches backing the request loaders.
//!
//! Entity fetches read rows by primary key. Edge fetches read the link table
//! by foreign key and return, per parent, the ids on the far side of the
//! edge. Where the link rows are the target rows themselves (posts,
//! profiles) the edge fetch also seeds the target's entity loader.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use trellis_schema::{
    Edge, EdgeSet, Entity, EntityKey, EntityKind, Id, MemberType, MemberTypeId, Post, Profile,
    User,
};

use super::batch::{BatchFn, BatchedLoader};
use crate::error::{QueryError, QueryResult};
use crate::store::memory::index_by_key;
use crate::traits::{BoxFuture, Predicate, Store};

/// A typed view of one entity kind.
pub trait Record: Clone + Send + Sync + Sized + 'static {
    /// Key type of the kind.
    type Key: Eq + Hash + Clone + Copy + Into<EntityKey> + std::fmt::Debug + Send + Sync + 'static;

    /// Entity kind the record belongs to.
    const KIND: EntityKind;

    /// Primary key.
    fn key(&self) -> Self::Key;

    /// Narrow a dynamic row.
    fn from_entity(entity: Entity) -> Option<Self>;
}

macro_rules! record {
    ($ty:ty, $key:ty, $kind:ident) => {
        impl Record for $ty {
            type Key = $key;
            const KIND: EntityKind = EntityKind::$kind;

            fn key(&self) -> $key {
                self.id
            }

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$kind(row) => Some(row),
                    _ => None,
                }
            }
        }
    };
}

record!(User, Id, User);
record!(Post, Id, Post);
record!(Profile, Id, Profile);
record!(MemberType, MemberTypeId, MemberType);

/// Reads entities of one kind by primary key.
pub struct EntityBatch<T> {
    store: Arc<dyn Store>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> EntityBatch<T> {
    /// Create a fetch over a store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }
}

impl<T: Record> BatchFn<T::Key, T> for EntityBatch<T> {
    fn fetch_many<'a>(&'a self, keys: &'a [T::Key]) -> BoxFuture<'a, QueryResult<Vec<Option<T>>>> {
        Box::pin(async move {
            let joins = EdgeSet::new();
            let rows = self
                .store
                .find_many(T::KIND, Predicate::key_in(keys.iter().copied()), &joins)
                .await?;

            let by_key = index_by_key(rows);
            Ok(keys
                .iter()
                .map(|key| {
                    let key: EntityKey = (*key).into();
                    by_key
                        .get(&key)
                        .and_then(|row| T::from_entity(row.entity.clone()))
                })
                .collect())
        })
    }
}

/// Reads a to-many edge: parent id to related ids, in storage order.
///
/// Every parent gets a list; parents without related rows get an empty one.
pub struct EdgeBatch<T: Record> {
    store: Arc<dyn Store>,
    edge: Edge,
    target: Option<BatchedLoader<T::Key, T>>,
}

impl<T: Record<Key = Id>> EdgeBatch<T> {
    /// Create a fetch for `edge`.
    pub fn new(store: Arc<dyn Store>, edge: Edge) -> Self {
        Self {
            store,
            edge,
            target: None,
        }
    }

    /// Seed `loader` with the target rows the fetch reads.
    pub fn priming(mut self, loader: BatchedLoader<Id, T>) -> Self {
        self.target = Some(loader);
        self
    }

    async fn related(&self, parents: &[Id]) -> QueryResult<Vec<Vec<Id>>> {
        let spec = self.edge.spec();
        let joins = EdgeSet::new();
        let rows = self
            .store
            .find_many(
                spec.link,
                Predicate::field_in(spec.foreign_key, parents.iter().copied()),
                &joins,
            )
            .await?;

        let mut grouped: HashMap<Id, Vec<Id>> = HashMap::with_capacity(parents.len());
        for row in rows {
            let parent = row.entity.key_field(spec.foreign_key).and_then(|k| k.as_id());
            let related = row.entity.key_field(spec.related_key).and_then(|k| k.as_id());
            let (Some(parent), Some(related)) = (parent, related) else {
                return Err(QueryError::internal(format!(
                    "{} row is missing {} or {}",
                    spec.link, spec.foreign_key, spec.related_key
                )));
            };

            if let Some(target) = &self.target {
                if let Some(record) = T::from_entity(row.entity) {
                    target.prime(related, record);
                }
            }
            grouped.entry(parent).or_default().push(related);
        }

        Ok(parents
            .iter()
            .map(|parent| grouped.remove(parent).unwrap_or_default())
            .collect())
    }
}

impl<T: Record<Key = Id>> BatchFn<Id, Vec<Id>> for EdgeBatch<T> {
    fn fetch_many<'a>(
        &'a self,
        keys: &'a [Id],
    ) -> BoxFuture<'a, QueryResult<Vec<Option<Vec<Id>>>>> {
        Box::pin(async move {
            let lists = self.related(keys).await?;
            Ok(lists.into_iter().map(Some).collect())
        })
    }
}

/// Reads a to-one edge: parent id to the related id, if any.
pub struct OneEdgeBatch<T: Record>(EdgeBatch<T>);

impl<T: Record<Key = Id>> OneEdgeBatch<T> {
    /// Wrap a to-many fetch, keeping the first related id.
    pub fn new(inner: EdgeBatch<T>) -> Self {
        Self(inner)
    }
}

impl<T: Record<Key = Id>> BatchFn<Id, Id> for OneEdgeBatch<T> {
    fn fetch_many<'a>(&'a self, keys: &'a [Id]) -> BoxFuture<'a, QueryResult<Vec<Option<Id>>>> {
        Box::pin(async move {
            let lists = self.0.related(keys).await?;
            Ok(lists.into_iter().map(|ids| ids.first().copied()).collect())
        })
    }
}

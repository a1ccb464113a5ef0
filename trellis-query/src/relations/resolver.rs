//! Resolving relation fields through the request's loaders.

use trellis_schema::{Edge, Entity, Id, MemberType, Multiplicity, Post, Profile, User};

use crate::error::QueryResult;
use crate::loader::{BatchedLoader, Record, RequestLoaderSet};

/// The value of a relation field.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A to-one edge.
    One(Option<Entity>),
    /// A to-many edge, in edge order.
    Many(Vec<Entity>),
}

impl Related {
    /// Empty value for an edge's multiplicity.
    pub fn empty(edge: Edge) -> Self {
        match edge.spec().multiplicity {
            Multiplicity::One => Self::One(None),
            Multiplicity::Many => Self::Many(Vec::new()),
        }
    }

    /// Check if nothing is related.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(entity) => entity.is_none(),
            Self::Many(entities) => entities.is_empty(),
        }
    }
}

/// Resolves relation fields of already-loaded parents.
///
/// Each step is one edge-loader lookup followed by an entity-loader fan-out,
/// so parents resolved together share both batches. A missing edge entry or
/// a dangling related id yields an empty result rather than an error.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'a> {
    loaders: &'a RequestLoaderSet,
}

impl<'a> RelationResolver<'a> {
    /// Create a resolver over a loader set.
    pub fn new(loaders: &'a RequestLoaderSet) -> Self {
        Self { loaders }
    }

    /// Resolve `edge` for `parent`. A parent of the wrong kind relates to nothing.
    pub async fn resolve(&self, edge: Edge, parent: &Entity) -> QueryResult<Related> {
        let related = match (edge, parent) {
            (Edge::UserPosts, Entity::User(user)) => {
                Related::Many(self.posts_of(user.id).await?.into_iter().map(Entity::from).collect())
            }
            (Edge::UserProfile, Entity::User(user)) => {
                Related::One(self.profile_of(user.id).await?.map(Entity::from))
            }
            (Edge::ProfileMemberType, Entity::Profile(profile)) => {
                Related::One(self.member_type_of(profile).await?.map(Entity::from))
            }
            (Edge::UserSubscribedTo, Entity::User(user)) => Related::Many(
                self.subscribed_to(user.id).await?.into_iter().map(Entity::from).collect(),
            ),
            (Edge::SubscribedToUser, Entity::User(user)) => Related::Many(
                self.subscribers_of(user.id).await?.into_iter().map(Entity::from).collect(),
            ),
            _ => Related::empty(edge),
        };
        Ok(related)
    }

    /// Posts authored by a user.
    pub async fn posts_of(&self, user: Id) -> QueryResult<Vec<Post>> {
        self.fan_out(self.loaders.user_posts(), self.loaders.posts(), user).await
    }

    /// A user's profile.
    pub async fn profile_of(&self, user: Id) -> QueryResult<Option<Profile>> {
        match self.loaders.user_profile().load(user).await? {
            Some(profile) => self.loaders.profiles().load(profile).await,
            None => Ok(None),
        }
    }

    /// The member type of a profile.
    pub async fn member_type_of(&self, profile: &Profile) -> QueryResult<Option<MemberType>> {
        self.loaders.member_types().load(profile.member_type_id).await
    }

    /// Users that `user` subscribes to.
    pub async fn subscribed_to(&self, user: Id) -> QueryResult<Vec<User>> {
        self.fan_out(self.loaders.user_subscribed_to(), self.loaders.users(), user).await
    }

    /// Users subscribed to `user`.
    pub async fn subscribers_of(&self, user: Id) -> QueryResult<Vec<User>> {
        self.fan_out(self.loaders.subscribed_to_user(), self.loaders.users(), user).await
    }

    async fn fan_out<T: Record<Key = Id>>(
        &self,
        edge: &BatchedLoader<Id, Vec<Id>>,
        target: &BatchedLoader<Id, T>,
        parent: Id,
    ) -> QueryResult<Vec<T>> {
        let ids = edge.load(parent).await?.unwrap_or_default();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = target.load_many(ids).await?;
        Ok(rows.into_iter().flatten().collect())
    }
}

//! The loaders of one request.

use std::fmt;
use std::sync::Arc;

use trellis_schema::{
    Edge, Entity, EntityKind, Id, MemberType, MemberTypeId, Post, Profile, TrellisConfig, User,
};

use super::batch::{BatchedLoader, LoaderStats};
use super::fetch::{EdgeBatch, EntityBatch, OneEdgeBatch};
use crate::traits::Store;

/// Names of the loaders in a [`RequestLoaderSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderName {
    /// Users by id.
    Users,
    /// Posts by id.
    Posts,
    /// Profiles by id.
    Profiles,
    /// Member types by id.
    MemberTypes,
    /// Post ids by author id.
    UserPosts,
    /// Profile id by user id.
    UserProfile,
    /// Followed user ids by subscriber id.
    UserSubscribedTo,
    /// Subscriber ids by followed user id.
    SubscribedToUser,
}

impl LoaderName {
    /// Every loader name.
    pub const ALL: [LoaderName; 8] = [
        Self::Users,
        Self::Posts,
        Self::Profiles,
        Self::MemberTypes,
        Self::UserPosts,
        Self::UserProfile,
        Self::UserSubscribedTo,
        Self::SubscribedToUser,
    ];

    /// Name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Posts => "posts",
            Self::Profiles => "profiles",
            Self::MemberTypes => "member_types",
            Self::UserPosts => "user_posts",
            Self::UserProfile => "user_profile",
            Self::UserSubscribedTo => "user_subscribed_to",
            Self::SubscribedToUser => "subscribed_to_user",
        }
    }

    /// Entity loader for a kind. Subscriptions have none.
    pub fn for_entity(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::User => Some(Self::Users),
            EntityKind::Post => Some(Self::Posts),
            EntityKind::Profile => Some(Self::Profiles),
            EntityKind::MemberType => Some(Self::MemberTypes),
            EntityKind::Subscription => None,
        }
    }

    /// Edge loader for an edge. The member type edge reads its key off the
    /// profile row and goes straight to the entity loader.
    pub fn for_edge(edge: Edge) -> Option<Self> {
        match edge {
            Edge::UserPosts => Some(Self::UserPosts),
            Edge::UserProfile => Some(Self::UserProfile),
            Edge::UserSubscribedTo => Some(Self::UserSubscribedTo),
            Edge::SubscribedToUser => Some(Self::SubscribedToUser),
            Edge::ProfileMemberType => None,
        }
    }
}

impl fmt::Display for LoaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed loader looked up by name.
#[derive(Debug, Clone, Copy)]
pub enum LoaderRef<'a> {
    /// Users by id.
    Users(&'a BatchedLoader<Id, User>),
    /// Posts by id.
    Posts(&'a BatchedLoader<Id, Post>),
    /// Profiles by id.
    Profiles(&'a BatchedLoader<Id, Profile>),
    /// Member types by id.
    MemberTypes(&'a BatchedLoader<MemberTypeId, MemberType>),
    /// A to-many edge.
    Many(&'a BatchedLoader<Id, Vec<Id>>),
    /// A to-one edge.
    One(&'a BatchedLoader<Id, Id>),
}

impl LoaderRef<'_> {
    /// Counters of the referenced loader.
    pub fn stats(&self) -> LoaderStats {
        match self {
            Self::Users(l) => l.stats(),
            Self::Posts(l) => l.stats(),
            Self::Profiles(l) => l.stats(),
            Self::MemberTypes(l) => l.stats(),
            Self::Many(l) => l.stats(),
            Self::One(l) => l.stats(),
        }
    }

    /// Forget every memoized key.
    pub fn clear_all(&self) {
        match self {
            Self::Users(l) => l.clear_all(),
            Self::Posts(l) => l.clear_all(),
            Self::Profiles(l) => l.clear_all(),
            Self::MemberTypes(l) => l.clear_all(),
            Self::Many(l) => l.clear_all(),
            Self::One(l) => l.clear_all(),
        }
    }
}

/// Every loader a request needs, created together and dropped together.
///
/// Never share a set between requests: memoized values would leak across
/// them and a failure in one would poison the other.
#[derive(Debug, Clone)]
pub struct RequestLoaderSet {
    users: BatchedLoader<Id, User>,
    posts: BatchedLoader<Id, Post>,
    profiles: BatchedLoader<Id, Profile>,
    member_types: BatchedLoader<MemberTypeId, MemberType>,
    user_posts: BatchedLoader<Id, Vec<Id>>,
    user_profile: BatchedLoader<Id, Id>,
    user_subscribed_to: BatchedLoader<Id, Vec<Id>>,
    subscribed_to_user: BatchedLoader<Id, Vec<Id>>,
}

impl RequestLoaderSet {
    /// Build a fresh set over a store.
    pub fn new(store: Arc<dyn Store>, config: &TrellisConfig) -> Self {
        let loader = &config.loader;
        let log_batches = config.debug.log_batches;

        let users = BatchedLoader::new(
            LoaderName::Users.as_str(),
            EntityBatch::<User>::new(store.clone()),
            loader,
        )
        .with_batch_logging(log_batches);
        let posts = BatchedLoader::new(
            LoaderName::Posts.as_str(),
            EntityBatch::<Post>::new(store.clone()),
            loader,
        )
        .with_batch_logging(log_batches);
        let profiles = BatchedLoader::new(
            LoaderName::Profiles.as_str(),
            EntityBatch::<Profile>::new(store.clone()),
            loader,
        )
        .with_batch_logging(log_batches);
        let member_types = BatchedLoader::new(
            LoaderName::MemberTypes.as_str(),
            EntityBatch::<MemberType>::new(store.clone()),
            loader,
        )
        .with_batch_logging(log_batches);

        let user_posts = BatchedLoader::new(
            LoaderName::UserPosts.as_str(),
            EdgeBatch::new(store.clone(), Edge::UserPosts).priming(posts.clone()),
            loader,
        )
        .with_batch_logging(log_batches);
        let user_profile = BatchedLoader::new(
            LoaderName::UserProfile.as_str(),
            OneEdgeBatch::new(
                EdgeBatch::new(store.clone(), Edge::UserProfile).priming(profiles.clone()),
            ),
            loader,
        )
        .with_batch_logging(log_batches);
        let user_subscribed_to = BatchedLoader::new(
            LoaderName::UserSubscribedTo.as_str(),
            EdgeBatch::<User>::new(store.clone(), Edge::UserSubscribedTo),
            loader,
        )
        .with_batch_logging(log_batches);
        let subscribed_to_user = BatchedLoader::new(
            LoaderName::SubscribedToUser.as_str(),
            EdgeBatch::<User>::new(store, Edge::SubscribedToUser),
            loader,
        )
        .with_batch_logging(log_batches);

        Self {
            users,
            posts,
            profiles,
            member_types,
            user_posts,
            user_profile,
            user_subscribed_to,
            subscribed_to_user,
        }
    }

    /// Look up a loader by name.
    pub fn get(&self, name: LoaderName) -> LoaderRef<'_> {
        match name {
            LoaderName::Users => LoaderRef::Users(&self.users),
            LoaderName::Posts => LoaderRef::Posts(&self.posts),
            LoaderName::Profiles => LoaderRef::Profiles(&self.profiles),
            LoaderName::MemberTypes => LoaderRef::MemberTypes(&self.member_types),
            LoaderName::UserPosts => LoaderRef::Many(&self.user_posts),
            LoaderName::UserProfile => LoaderRef::One(&self.user_profile),
            LoaderName::UserSubscribedTo => LoaderRef::Many(&self.user_subscribed_to),
            LoaderName::SubscribedToUser => LoaderRef::Many(&self.subscribed_to_user),
        }
    }

    /// Users by id.
    pub fn users(&self) -> &BatchedLoader<Id, User> {
        &self.users
    }

    /// Posts by id.
    pub fn posts(&self) -> &BatchedLoader<Id, Post> {
        &self.posts
    }

    /// Profiles by id.
    pub fn profiles(&self) -> &BatchedLoader<Id, Profile> {
        &self.profiles
    }

    /// Member types by id.
    pub fn member_types(&self) -> &BatchedLoader<MemberTypeId, MemberType> {
        &self.member_types
    }

    /// Post ids by author.
    pub fn user_posts(&self) -> &BatchedLoader<Id, Vec<Id>> {
        &self.user_posts
    }

    /// Profile id by user.
    pub fn user_profile(&self) -> &BatchedLoader<Id, Id> {
        &self.user_profile
    }

    /// Followed user ids by subscriber.
    pub fn user_subscribed_to(&self) -> &BatchedLoader<Id, Vec<Id>> {
        &self.user_subscribed_to
    }

    /// Subscriber ids by followed user.
    pub fn subscribed_to_user(&self) -> &BatchedLoader<Id, Vec<Id>> {
        &self.subscribed_to_user
    }

    /// The to-many edge loader for `edge`, if it has one.
    pub fn many_edge(&self, edge: Edge) -> Option<&BatchedLoader<Id, Vec<Id>>> {
        match edge {
            Edge::UserPosts => Some(&self.user_posts),
            Edge::UserSubscribedTo => Some(&self.user_subscribed_to),
            Edge::SubscribedToUser => Some(&self.subscribed_to_user),
            Edge::UserProfile | Edge::ProfileMemberType => None,
        }
    }

    /// The to-one edge loader for `edge`, if it has one.
    pub fn one_edge(&self, edge: Edge) -> Option<&BatchedLoader<Id, Id>> {
        match edge {
            Edge::UserProfile => Some(&self.user_profile),
            _ => None,
        }
    }

    /// Seed the entity loader matching a row. Subscription rows are ignored.
    pub fn prime_entity(&self, entity: &Entity) -> bool {
        match entity {
            Entity::User(row) => self.users.prime(row.id, row.clone()),
            Entity::Post(row) => self.posts.prime(row.id, row.clone()),
            Entity::Profile(row) => self.profiles.prime(row.id, row.clone()),
            Entity::MemberType(row) => self.member_types.prime(row.id, row.clone()),
            Entity::Subscription(_) => false,
        }
    }

    /// Counters of one loader.
    pub fn stats(&self, name: LoaderName) -> LoaderStats {
        self.get(name).stats()
    }

    /// Counters of every loader.
    pub fn all_stats(&self) -> Vec<(LoaderName, LoaderStats)> {
        LoaderName::ALL
            .into_iter()
            .map(|name| (name, self.stats(name)))
            .collect()
    }

    /// Total bulk fetches issued by the set.
    pub fn total_batches(&self) -> u64 {
        self.all_stats().iter().map(|(_, stats)| stats.batches).sum()
    }

    /// Forget every memoized key in every loader.
    pub fn clear_all(&self) {
        for name in LoaderName::ALL {
            self.get(name).clear_all();
        }
    }
}

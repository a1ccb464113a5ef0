//! Entity declarations: the rows the loaders materialize and cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::edge::Edge;

/// Primary identifier of every UUID-keyed entity.
pub type Id = Uuid;

/// Identifier of a member type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberTypeId {
    /// Basic membership.
    Basic,
    /// Business membership.
    Business,
}

impl MemberTypeId {
    /// All member type ids, in declaration order.
    pub const ALL: [MemberTypeId; 2] = [Self::Basic, Self::Business];

    /// The wire name of this id.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Business => "business",
        }
    }
}

impl fmt::Display for MemberTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberTypeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "business" => Ok(Self::Business),
            other => Err(format!("unknown member type `{}`", other)),
        }
    }
}

/// A user; the node type of the subscriber/author graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary key.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Account balance.
    pub balance: f64,
}

/// A post written by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Primary key.
    pub id: Id,
    /// Title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// The writing user.
    pub author_id: Id,
}

/// A user's profile (at most one per user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Primary key.
    pub id: Id,
    /// Self-reported gender flag.
    pub is_male: bool,
    /// Year of birth.
    pub year_of_birth: i32,
    /// Owning user.
    pub user_id: Id,
    /// Membership tier.
    pub member_type_id: MemberTypeId,
}

/// A membership tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberType {
    /// Primary key.
    pub id: MemberTypeId,
    /// Discount percentage.
    pub discount: f64,
    /// Monthly post quota.
    pub posts_limit_per_month: i32,
}

/// A directed "subscribes to" link between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// The following user.
    pub subscriber_id: Id,
    /// The followed user.
    pub author_id: Id,
}

/// The declared entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// [`User`].
    User,
    /// [`Post`].
    Post,
    /// [`Profile`].
    Profile,
    /// [`MemberType`].
    MemberType,
    /// [`Subscription`].
    Subscription,
}

/// How a field of an entity is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Read straight from the row.
    Scalar,
    /// Resolved through a relation edge.
    Relation(Edge),
}

impl EntityKind {
    /// Type name as exposed to clients.
    pub fn name(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Post => "Post",
            Self::Profile => "Profile",
            Self::MemberType => "MemberType",
            Self::Subscription => "Subscription",
        }
    }

    /// Scalar fields, in declaration order.
    pub fn scalar_fields(&self) -> &'static [&'static str] {
        match self {
            Self::User => &["id", "name", "balance"],
            Self::Post => &["id", "title", "content", "authorId"],
            Self::Profile => &["id", "isMale", "yearOfBirth", "userId", "memberTypeId"],
            Self::MemberType => &["id", "discount", "postsLimitPerMonth"],
            Self::Subscription => &["subscriberId", "authorId"],
        }
    }

    /// Relation edges whose source is this entity.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        Edge::ALL.into_iter().filter(move |edge| edge.spec().source == *self)
    }

    /// Classify a field name.
    pub fn field(&self, name: &str) -> Option<FieldKind> {
        if self.scalar_fields().contains(&name) {
            return Some(FieldKind::Scalar);
        }
        self.edges()
            .find(|edge| edge.spec().field == name)
            .map(FieldKind::Relation)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Primary key of a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    /// UUID primary key.
    Id(Id),
    /// Member type primary key.
    MemberType(MemberTypeId),
}

impl EntityKey {
    /// Parse a key from its textual form for the given entity type.
    pub fn parse(kind: EntityKind, raw: &str) -> Result<Self, String> {
        match kind {
            EntityKind::MemberType => raw.parse().map(Self::MemberType),
            _ => Uuid::parse_str(raw)
                .map(Self::Id)
                .map_err(|e| format!("invalid {} id `{}`: {}", kind, raw, e)),
        }
    }

    /// The UUID, if this is a UUID key.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Self::Id(id) => Some(*id),
            Self::MemberType(_) => None,
        }
    }
}

impl From<Id> for EntityKey {
    fn from(id: Id) -> Self {
        Self::Id(id)
    }
}

impl From<MemberTypeId> for EntityKey {
    fn from(id: MemberTypeId) -> Self {
        Self::MemberType(id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::MemberType(id) => write!(f, "{}", id),
        }
    }
}

/// A row of any declared entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    /// A user row.
    User(User),
    /// A post row.
    Post(Post),
    /// A profile row.
    Profile(Profile),
    /// A member type row.
    MemberType(MemberType),
    /// A subscription row.
    Subscription(Subscription),
}

impl Entity {
    /// The entity type of this row.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Post(_) => EntityKind::Post,
            Self::Profile(_) => EntityKind::Profile,
            Self::MemberType(_) => EntityKind::MemberType,
            Self::Subscription(_) => EntityKind::Subscription,
        }
    }

    /// Primary key of this row. Subscriptions have a composite key and return `None`.
    pub fn key(&self) -> Option<EntityKey> {
        match self {
            Self::User(u) => Some(EntityKey::Id(u.id)),
            Self::Post(p) => Some(EntityKey::Id(p.id)),
            Self::Profile(p) => Some(EntityKey::Id(p.id)),
            Self::MemberType(m) => Some(EntityKey::MemberType(m.id)),
            Self::Subscription(_) => None,
        }
    }

    /// Read a key-valued column (`id` or a foreign key) without going through JSON.
    pub fn key_field(&self, field: &str) -> Option<EntityKey> {
        let key = match (self, field) {
            (Self::User(u), "id") => EntityKey::Id(u.id),
            (Self::Post(p), "id") => EntityKey::Id(p.id),
            (Self::Post(p), "authorId") => EntityKey::Id(p.author_id),
            (Self::Profile(p), "id") => EntityKey::Id(p.id),
            (Self::Profile(p), "userId") => EntityKey::Id(p.user_id),
            (Self::Profile(p), "memberTypeId") => EntityKey::MemberType(p.member_type_id),
            (Self::MemberType(m), "id") => EntityKey::MemberType(m.id),
            (Self::Subscription(s), "subscriberId") => EntityKey::Id(s.subscriber_id),
            (Self::Subscription(s), "authorId") => EntityKey::Id(s.author_id),
            _ => return None,
        };
        Some(key)
    }

    /// Read a scalar field as JSON. Returns `None` for undeclared fields.
    pub fn scalar(&self, field: &str) -> Option<serde_json::Value> {
        use serde_json::Value;

        let value = match (self, field) {
            (Self::User(u), "id") => Value::from(u.id.to_string()),
            (Self::User(u), "name") => Value::from(u.name.clone()),
            (Self::User(u), "balance") => Value::from(u.balance),
            (Self::Post(p), "id") => Value::from(p.id.to_string()),
            (Self::Post(p), "title") => Value::from(p.title.clone()),
            (Self::Post(p), "content") => Value::from(p.content.clone()),
            (Self::Post(p), "authorId") => Value::from(p.author_id.to_string()),
            (Self::Profile(p), "id") => Value::from(p.id.to_string()),
            (Self::Profile(p), "isMale") => Value::from(p.is_male),
            (Self::Profile(p), "yearOfBirth") => Value::from(p.year_of_birth),
            (Self::Profile(p), "userId") => Value::from(p.user_id.to_string()),
            (Self::Profile(p), "memberTypeId") => Value::from(p.member_type_id.as_str()),
            (Self::MemberType(m), "id") => Value::from(m.id.as_str()),
            (Self::MemberType(m), "discount") => Value::from(m.discount),
            (Self::MemberType(m), "postsLimitPerMonth") => Value::from(m.posts_limit_per_month),
            (Self::Subscription(s), "subscriberId") => Value::from(s.subscriber_id.to_string()),
            (Self::Subscription(s), "authorId") => Value::from(s.author_id.to_string()),
            _ => return None,
        };
        Some(value)
    }
}

macro_rules! entity_from {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Entity {
                fn from(row: $ty) -> Self {
                    Self::$ty(row)
                }
            }
        )*
    };
}

entity_from!(User, Post, Profile, MemberType, Subscription);

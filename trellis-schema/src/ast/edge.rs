//! Relation edges between entity types.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::entity::EntityKind;

/// How many related rows an edge yields per parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// At most one related row.
    One,
    /// An ordered, possibly empty list of related rows.
    Many,
}

impl Multiplicity {
    /// Check if this is a "to-many" edge.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many)
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "1"),
            Self::Many => write!(f, "n"),
        }
    }
}

/// A named, directed relation between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Edge {
    /// User → the posts they wrote.
    UserPosts,
    /// User → their profile.
    UserProfile,
    /// Profile → its member type.
    ProfileMemberType,
    /// User → the authors they subscribe to (outgoing subscriptions).
    UserSubscribedTo,
    /// User → the users subscribed to them (incoming subscriptions).
    SubscribedToUser,
}

/// Static metadata of an [`Edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSpec {
    /// Field name on the source type.
    pub field: &'static str,
    /// Entity owning the field.
    pub source: EntityKind,
    /// Entity the field resolves to.
    pub target: EntityKind,
    /// One or many.
    pub multiplicity: Multiplicity,
    /// Entity whose rows carry the foreign key.
    pub link: EntityKind,
    /// Foreign-key column filtered by parent keys.
    pub foreign_key: &'static str,
    /// Column of the link row that holds the related key.
    pub related_key: &'static str,
    /// Whether the root fetch can join this edge.
    pub joinable: bool,
}

impl Edge {
    /// Every declared edge.
    pub const ALL: [Edge; 5] = [
        Self::UserPosts,
        Self::UserProfile,
        Self::ProfileMemberType,
        Self::UserSubscribedTo,
        Self::SubscribedToUser,
    ];

    /// Metadata for this edge.
    pub const fn spec(&self) -> EdgeSpec {
        match self {
            Self::UserPosts => EdgeSpec {
                field: "posts",
                source: EntityKind::User,
                target: EntityKind::Post,
                multiplicity: Multiplicity::Many,
                link: EntityKind::Post,
                foreign_key: "authorId",
                related_key: "id",
                joinable: true,
            },
            Self::UserProfile => EdgeSpec {
                field: "profile",
                source: EntityKind::User,
                target: EntityKind::Profile,
                multiplicity: Multiplicity::One,
                link: EntityKind::Profile,
                foreign_key: "userId",
                related_key: "id",
                joinable: true,
            },
            // The key is carried on the profile row itself.
            Self::ProfileMemberType => EdgeSpec {
                field: "memberType",
                source: EntityKind::Profile,
                target: EntityKind::MemberType,
                multiplicity: Multiplicity::One,
                link: EntityKind::Profile,
                foreign_key: "id",
                related_key: "memberTypeId",
                joinable: false,
            },
            Self::UserSubscribedTo => EdgeSpec {
                field: "userSubscribedTo",
                source: EntityKind::User,
                target: EntityKind::User,
                multiplicity: Multiplicity::Many,
                link: EntityKind::Subscription,
                foreign_key: "subscriberId",
                related_key: "authorId",
                joinable: true,
            },
            Self::SubscribedToUser => EdgeSpec {
                field: "subscribedToUser",
                source: EntityKind::User,
                target: EntityKind::User,
                multiplicity: Multiplicity::Many,
                link: EntityKind::Subscription,
                foreign_key: "authorId",
                related_key: "subscriberId",
                joinable: true,
            },
        }
    }

    /// Field name on the source type.
    pub fn field(&self) -> &'static str {
        self.spec().field
    }

    /// Look up an edge by source type and field name.
    pub fn from_field(source: EntityKind, field: &str) -> Option<Edge> {
        Self::ALL
            .into_iter()
            .find(|edge| edge.spec().source == source && edge.spec().field == field)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self.spec();
        write!(f, "{}.{}", spec.source, spec.field)
    }
}

/// A small ordered set of edges.
///
/// Insertion order is kept so logs and storage calls are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSet {
    edges: SmallVec<[Edge; 4]>,
}

impl EdgeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge. Returns `false` if it was already present.
    pub fn insert(&mut self, edge: Edge) -> bool {
        if self.edges.contains(&edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Check membership.
    pub fn contains(&self, edge: Edge) -> bool {
        self.edges.contains(&edge)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().copied()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl FromIterator<Edge> for EdgeSet {
    fn from_iter<T: IntoIterator<Item = Edge>>(iter: T) -> Self {
        let mut set = Self::new();
        for edge in iter {
            set.insert(edge);
        }
        set
    }
}

impl<'a> IntoIterator for &'a EdgeSet {
    type Item = Edge;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Edge>>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_edges_filter_opposite_columns() {
        let outgoing = Edge::UserSubscribedTo.spec();
        let incoming = Edge::SubscribedToUser.spec();

        assert_eq!(outgoing.link, EntityKind::Subscription);
        assert_eq!(incoming.link, EntityKind::Subscription);
        assert_eq!(outgoing.foreign_key, incoming.related_key);
        assert_eq!(outgoing.related_key, incoming.foreign_key);
    }

    #[test]
    fn test_from_field() {
        assert_eq!(
            Edge::from_field(EntityKind::User, "posts"),
            Some(Edge::UserPosts)
        );
        assert_eq!(Edge::from_field(EntityKind::Post, "posts"), None);
    }

    #[test]
    fn test_edge_set_dedups_and_keeps_order() {
        let mut set = EdgeSet::new();
        assert!(set.insert(Edge::SubscribedToUser));
        assert!(set.insert(Edge::UserPosts));
        assert!(!set.insert(Edge::SubscribedToUser));

        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Edge::SubscribedToUser, Edge::UserPosts]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Edge::UserSubscribedTo.to_string(), "User.userSubscribedTo");
        assert_eq!(Multiplicity::Many.to_string(), "n");
    }
}

//! Declarations consumed by the loader core.
//!
//! - [`entity`]: entity rows and their keys
//! - [`edge`]: relation edges and their metadata
//! - [`selection`]: requested query shapes

pub mod edge;
pub mod entity;
pub mod selection;

pub use edge::{Edge, EdgeSet, EdgeSpec, Multiplicity};
pub use entity::{
    Entity, EntityKey, EntityKind, FieldKind, Id, MemberType, MemberTypeId, Post, Profile,
    Subscription, User,
};
pub use selection::{SelectionNode, SelectionTree};

//! # trellis-schema
//!
//! Declarations consumed by the Trellis loader core.
//!
//! This crate provides:
//! - Entity rows and keys (`User`, `Post`, `Profile`, `MemberType`, `Subscription`)
//! - Relation edges with their direction, multiplicity and foreign keys
//! - Selection trees, built programmatically or parsed from query text
//! - Configuration parser for `trellis.toml` files
//!
//! ## Example
//!
//! ```rust
//! use trellis_schema::{Edge, EntityKind, SelectionTree};
//!
//! let tree = SelectionTree::parse("{ users { id userSubscribedTo { id } } }").unwrap();
//! let users = &tree.roots[0];
//!
//! assert!(users.has_child("userSubscribedTo"));
//! assert_eq!(
//!     Edge::from_field(EntityKind::User, "userSubscribedTo"),
//!     Some(Edge::UserSubscribedTo)
//! );
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod parser;

pub use ast::*;
pub use config::{LoaderConfig, LookupPolicy, SelectionConfig, TrellisConfig};
pub use error::{SchemaError, SchemaResult};
pub use parser::parse_selection;

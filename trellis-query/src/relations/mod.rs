//! Relation loading: deciding what to join up front and resolving the rest
//! through the loaders.
//!
//! ## Example
//!
//! ```rust
//! use trellis_query::relations::FieldSelectionAnalyzer;
//! use trellis_schema::{Edge, EntityKind, SelectionTree};
//!
//! let tree = SelectionTree::parse("{ users { id posts { title } } }").unwrap();
//! let edges = FieldSelectionAnalyzer::default().analyze(&tree.roots[0], EntityKind::User);
//!
//! assert!(edges.contains(Edge::UserPosts));
//! ```

mod analyzer;
mod resolver;

pub use analyzer::FieldSelectionAnalyzer;
pub use resolver::{Related, RelationResolver};

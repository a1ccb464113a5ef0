//! # Trellis
//!
//! Per-request batched relation loading for graph-shaped queries.
//!
//! Trellis provides:
//! - Batched, deduplicating loaders scoped to one request
//! - Relation edges between users, posts, profiles and member types
//! - Eager joins for relations the selection asks for, with loader priming
//! - A query executor that turns a selection tree into JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::prelude::*;
//! use trellis::schema::User;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ann = User { id: uuid::Uuid::new_v4(), name: "ann".into(), balance: 10.0 };
//! let store = Arc::new(MemoryStore::new().with(ann.clone()));
//! let executor = QueryExecutor::new(store, TrellisConfig::default());
//!
//! let response = executor.execute_str("{ users { name posts { title } } }").await;
//!
//! assert!(response.is_ok());
//! assert_eq!(
//!     response.data,
//!     serde_json::json!({ "users": [{ "name": "ann", "posts": [] }] })
//! );
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Entities, edges, selection trees and configuration.
pub mod schema {
    pub use trellis_schema::*;
}

/// Loaders, relation resolution and query execution.
pub mod query {
    pub use trellis_query::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::query::prelude::*;
    pub use crate::query::store::MemoryStore;
    pub use crate::schema::{
        Edge, Entity, EntityKind, SelectionNode, SelectionTree, TrellisConfig,
    };
}

// Re-export key types at the crate root
pub use query::{QueryError, QueryExecutor, QueryResult, Response};
pub use schema::{SchemaError, TrellisConfig};

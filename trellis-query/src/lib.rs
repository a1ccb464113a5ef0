//! # trellis-query
//!
//! Per-request batched relation loading for the Trellis query core.
//!
//! This crate provides:
//! - `BatchedLoader`, a key-to-value loader that coalesces loads issued in
//!   the same scheduling tick into one bulk fetch and memoizes results
//! - The per-request loader set, one loader per entity kind and per edge
//! - Selection analysis that decides which relations to join eagerly
//! - Priming of loaders from eagerly joined rows
//! - A query executor that walks a selection tree into JSON
//! - Mutations that keep the request's loaders coherent
//! - The `Store` seam and an in-memory reference store
//!
//! ## Loaders
//!
//! Loads issued together share one batch:
//!
//! ```rust
//! use trellis_query::error::QueryResult;
//! use trellis_query::loader::{BatchedLoader, batch_fn};
//! use trellis_schema::LoaderConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let loader = BatchedLoader::new(
//!     "squares",
//!     batch_fn(|keys: Vec<u32>| async move {
//!         QueryResult::Ok(keys.iter().map(|k| Some(k * k)).collect())
//!     }),
//!     &LoaderConfig::default(),
//! );
//!
//! let (a, b) = tokio::join!(loader.load(3), loader.load(4));
//! assert_eq!(a.unwrap(), Some(9));
//! assert_eq!(b.unwrap(), Some(16));
//! assert_eq!(loader.stats().batches, 1);
//! # }
//! ```
//!
//! ## Executing Queries
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_query::{QueryExecutor, store::MemoryStore};
//! use trellis_schema::TrellisConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = QueryExecutor::new(Arc::new(MemoryStore::new()), TrellisConfig::default());
//! let response = executor.execute_str("{ users { id } }").await;
//!
//! assert!(response.is_ok());
//! assert_eq!(response.data, serde_json::json!({ "users": [] }));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use trellis_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! ```

pub mod error;
pub mod executor;
pub mod loader;
pub mod logging;
pub mod mutation;
pub mod relations;
pub mod store;
pub mod traits;

pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, Suggestion};
pub use executor::{FieldError, Path, PathSegment, QueryExecutor, RequestContext, Response};
pub use loader::{
    BatchFn, BatchedLoader, LoaderName, LoaderRef, LoaderStats, PrimeReport, Primer, Record,
    RequestLoaderSet, batch_fn,
};
pub use mutation::{
    ChangePostInput, ChangeProfileInput, ChangeUserInput, CreatePostInput, CreateProfileInput,
    CreateUserInput, Mutations,
};
pub use relations::{FieldSelectionAnalyzer, Related, RelationResolver};
pub use store::{MemoryStore, StoreCall};
pub use traits::{BoxFuture, Predicate, Row, Store};

// Re-export logging utilities
pub use logging::{
    LogFormat, LogSettings, init as init_logging, init_debug, init_with_level, is_debug_enabled,
    log_format, log_level,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::executor::{QueryExecutor, RequestContext, Response};
    pub use crate::loader::{BatchedLoader, LoaderName, RequestLoaderSet, batch_fn};
    pub use crate::mutation::Mutations;
    pub use crate::relations::{FieldSelectionAnalyzer, RelationResolver};
    pub use crate::traits::{Predicate, Row, Store};
}

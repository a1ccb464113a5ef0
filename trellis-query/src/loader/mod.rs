//! Request-scoped batched loaders.
//!
//! - [`BatchedLoader`]: the generic batching and memoizing primitive
//! - [`fetch`]: bulk fetches for entities and edges over a [`crate::traits::Store`]
//! - [`RequestLoaderSet`]: the full set of loaders for one request
//! - [`Primer`]: seeds a set from eagerly joined rows

pub mod batch;
pub mod fetch;
pub mod primer;
pub mod set;

pub use batch::{BatchFn, BatchedLoader, FnBatch, LoaderStats, batch_fn};
pub use fetch::{EdgeBatch, EntityBatch, OneEdgeBatch, Record};
pub use primer::{PrimeReport, Primer};
pub use set::{LoaderName, LoaderRef, RequestLoaderSet};

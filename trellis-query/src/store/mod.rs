//! Storage implementations.
//!
//! Only the in-memory store ships with the crate. Database-backed stores
//! implement [`crate::traits::Store`] out of tree.

pub mod memory;

pub use memory::{MemoryStore, StoreCall};

//! Storage and persistence layer
//!
//! This module defines the pluggable mapper capability the engine persists
//! through, the record and mutation types that cross that boundary, and the
//! in-memory reference backend.

pub mod factory;
pub mod mapper;
pub mod mem_store;

// Re-export main storage types
pub use factory::{create_shared_store, create_store, SharedMapper};
pub use mapper::{Criteria, Mutation, NodeMapper, NodeRecord};
pub use mem_store::MemStore;

//! Entity Graph - A Persistence and Transaction Engine for Typed Entity Graphs
//!
//! Entity Graph is an embeddable engine for applications that persist typed
//! entities with composite string identifiers and ordered relations. It
//! provides identity-mapped loading to a bounded build depth, buffered
//! transactions with optimistic lock validation, and visitor-driven graph
//! output over a pluggable storage backend.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Main functional modules
pub mod graph;
pub mod session;
pub mod storage;
pub mod system;

// Re-export commonly used items for convenience
pub use crate::core::{
    BuildDepth, Config, Error, Node, NodeHandle, ObjectId, Result, TypeRegistry, Value,
};
pub use crate::session::{LockMode, PersistenceFacade, Principal, Session};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the engine with tracing and metrics
pub fn init() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Initializing {} v{}", NAME, VERSION);

    // Initialize metrics registry
    system::metrics::init_registry();

    Ok(())
}

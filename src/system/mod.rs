//! System-level services
//!
//! Cross-cutting runtime services for the engine; currently metrics
//! collection and the registry shared by all components.

pub mod metrics;

pub use metrics::Metrics;

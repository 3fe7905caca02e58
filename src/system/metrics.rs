//! Metrics collection and monitoring for the entity graph engine
//!
//! This module provides metrics collection using Prometheus, optimized for
//! minimal overhead during normal operations.

use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter, Registry};

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Operation counters for tracking entity lifecycle operations
pub struct OperationMetrics {
    /// Total number of nodes created
    pub nodes_created: IntCounter,
    /// Total number of nodes loaded from the backing store
    pub nodes_loaded: IntCounter,
    /// Total number of node saves buffered
    pub nodes_saved: IntCounter,
    /// Total number of node deletes buffered
    pub nodes_deleted: IntCounter,
}

/// Identity map cache metrics
pub struct CacheMetrics {
    /// Loads answered from the identity map
    pub identity_hits: IntCounter,
    /// Loads that went to the backing store
    pub identity_misses: IntCounter,
}

/// Transaction lifecycle metrics
pub struct TransactionMetrics {
    /// Total number of successful commits
    pub commits: IntCounter,
    /// Total number of commits failed by optimistic validation
    pub conflicts: IntCounter,
    /// Total number of rollbacks
    pub rollbacks: IntCounter,
    /// Histogram of commit durations in seconds
    pub commit_duration: Histogram,
}

/// Lock table metrics
pub struct LockMetrics {
    /// Total number of locks acquired or refreshed
    pub locks_acquired: IntCounter,
    /// Total number of rejected lock acquisitions
    pub lock_conflicts: IntCounter,
}

/// Centralized metrics collection for all engine components
pub struct Metrics {
    /// Entity lifecycle metrics (create/load/save/delete)
    pub operations: OperationMetrics,
    /// Identity map cache metrics
    pub cache: CacheMetrics,
    /// Transaction metrics (commits, conflicts, rollbacks)
    pub transactions: TransactionMetrics,
    /// Lock table metrics
    pub locks: LockMetrics,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self> {
        Ok(Self {
            operations: OperationMetrics::new()?,
            cache: CacheMetrics::new()?,
            transactions: TransactionMetrics::new()?,
            locks: LockMetrics::new()?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| {
            Metrics::new().expect("Failed to initialize metrics")
        });
        &INSTANCE
    }
}

impl OperationMetrics {
    /// Create a new OperationMetrics instance with registered Prometheus counters
    fn new() -> Result<Self> {
        Ok(Self {
            nodes_created: register_int_counter!(
                "eg_nodes_created_total",
                "Total number of nodes created"
            )?,
            nodes_loaded: register_int_counter!(
                "eg_nodes_loaded_total",
                "Total number of nodes loaded from the backing store"
            )?,
            nodes_saved: register_int_counter!(
                "eg_nodes_saved_total",
                "Total number of node saves buffered"
            )?,
            nodes_deleted: register_int_counter!(
                "eg_nodes_deleted_total",
                "Total number of node deletes buffered"
            )?,
        })
    }
}

impl CacheMetrics {
    /// Create a new CacheMetrics instance with registered Prometheus counters
    fn new() -> Result<Self> {
        Ok(Self {
            identity_hits: register_int_counter!(
                "eg_identity_hits_total",
                "Loads answered from the identity map"
            )?,
            identity_misses: register_int_counter!(
                "eg_identity_misses_total",
                "Loads that went to the backing store"
            )?,
        })
    }
}

impl TransactionMetrics {
    /// Create a new TransactionMetrics instance with registered Prometheus collectors
    fn new() -> Result<Self> {
        Ok(Self {
            commits: register_int_counter!(
                "eg_tx_commits_total",
                "Total number of successful commits"
            )?,
            conflicts: register_int_counter!(
                "eg_tx_conflicts_total",
                "Total number of commits failed by optimistic validation"
            )?,
            rollbacks: register_int_counter!(
                "eg_tx_rollbacks_total",
                "Total number of rollbacks"
            )?,
            commit_duration: register_histogram!(
                "eg_tx_commit_duration_seconds",
                "Histogram of commit durations in seconds"
            )?,
        })
    }
}

impl LockMetrics {
    /// Create a new LockMetrics instance with registered Prometheus counters
    fn new() -> Result<Self> {
        Ok(Self {
            locks_acquired: register_int_counter!(
                "eg_locks_acquired_total",
                "Total number of locks acquired or refreshed"
            )?,
            lock_conflicts: register_int_counter!(
                "eg_lock_conflicts_total",
                "Total number of rejected lock acquisitions"
            )?,
        })
    }
}

/// Initialize the metrics registry and global collectors
pub fn init_registry() {
    Lazy::force(&REGISTRY);
    let _ = Metrics::global();
}

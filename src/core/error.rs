//! Error types and handling for the entity graph engine
//!
//! This module defines all error types used throughout the system,
//! optimized for zero-cost error propagation and clear diagnostics.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the entity graph engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed object id string
    #[error("Malformed object id: {0}")]
    Format(String),

    /// Resource not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Optimistic lock validation failed at commit
    #[error("Commit conflict: {0}")]
    Conflict(String),

    /// Lock held by another principal
    #[error("Lock conflict: {0}")]
    LockConflict(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid transaction state transition
    #[error("Transaction error: {0}")]
    Tx(String),

    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend rejected a mutation batch
    #[error("Apply failed: {0}")]
    Apply(String),

    /// Corruption detected in stored data
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Unsupported storage backend
    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),
}

impl Error {
    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a lock conflict error
    pub fn lock_conflict(msg: impl Into<String>) -> Self {
        Self::LockConflict(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transaction state error
    pub fn tx(msg: impl Into<String>) -> Self {
        Self::Tx(msg.into())
    }

    /// Check if this error terminates the enclosing transaction
    pub fn is_transactional(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::LockConflict(_))
    }

    /// Check if this is a caller error (bad input or state)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Format(_)
                | Error::NotFound(_)
                | Error::Config(_)
                | Error::Tx(_)
                | Error::Serialization(_)
        )
    }

    /// Check if this is an engine/backend error
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_) | Error::Metrics(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::format("bad").is_client_error());
        assert!(Error::not_found("Publisher:1").is_client_error());
        assert!(Error::conflict("version moved").is_transactional());
        assert!(Error::lock_conflict("held").is_transactional());
        assert!(Error::Storage(StorageError::Apply("boom".into())).is_server_error());
        assert!(!Error::conflict("version moved").is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::format("expected Type:k1");
        assert_eq!(err.to_string(), "Malformed object id: expected Type:k1");

        let err = Error::Storage(StorageError::UnsupportedBackend("disk".into()));
        assert_eq!(err.to_string(), "Storage error: Unsupported storage backend: disk");
    }
}

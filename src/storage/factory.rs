//! Storage factory for creating backends based on configuration

use crate::core::config::{StorageBackend, StorageConfig};
use crate::core::error::{Error, Result, StorageError};
use crate::storage::mapper::NodeMapper;
use crate::storage::mem_store::MemStore;
use std::sync::Arc;

/// Shared handle to a storage backend
pub type SharedMapper = Arc<dyn NodeMapper>;

/// Create a storage backend based on configuration
pub fn create_store(config: &StorageConfig) -> Result<MemStore> {
    match config.backend {
        StorageBackend::Memory => Ok(MemStore::with_initial_key(config.initial_key)),
        StorageBackend::Disk => Err(Error::Storage(StorageError::UnsupportedBackend(
            "disk".to_string(),
        ))),
    }
}

/// Create a shared storage backend based on configuration
pub fn create_shared_store(config: &StorageConfig) -> Result<SharedMapper> {
    let store = create_store(config)?;
    Ok(Arc::new(store))
}

//! In-memory storage backend
//!
//! Reference [`NodeMapper`] implementation: records live in a concurrent
//! map keyed by object id, per-type key counters hand out monotonic primary
//! keys, and mutation batches are validated and applied under a single
//! apply guard so a batch is atomic with respect to every other batch.

use crate::core::error::{Error, Result, StorageError};
use crate::core::oid::ObjectId;
use crate::core::types::Version;
use crate::storage::mapper::{Criteria, Mutation, NodeMapper, NodeRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory node store
pub struct MemStore {
    /// Stored records keyed by id
    records: DashMap<ObjectId, NodeRecord>,

    /// Per-type monotonic key counters
    key_counters: DashMap<String, AtomicU64>,

    /// Serializes mutation batches; validation and apply happen under it
    apply_guard: Mutex<()>,

    /// First key handed out per type
    initial_key: u64,
}

impl MemStore {
    /// Create an empty store handing out keys from 1
    pub fn new() -> Self {
        Self::with_initial_key(1)
    }

    /// Create an empty store with a configured first key
    pub fn with_initial_key(initial_key: u64) -> Self {
        Self {
            records: DashMap::new(),
            key_counters: DashMap::new(),
            apply_guard: Mutex::new(()),
            initial_key,
        }
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Validate a batch against current store state. Called under the guard.
    fn validate(&self, mutations: &[Mutation]) -> Result<()> {
        for mutation in mutations {
            match mutation {
                Mutation::Create { record } => {
                    if self.records.contains_key(&record.oid) {
                        return Err(Error::Storage(StorageError::Apply(format!(
                            "create of existing id {}",
                            record.oid
                        ))));
                    }
                }
                Mutation::Update { record } => {
                    if !self.records.contains_key(&record.oid) {
                        return Err(Error::Storage(StorageError::Apply(format!(
                            "update of missing id {}",
                            record.oid
                        ))));
                    }
                }
                Mutation::Delete { oid } => {
                    if !self.records.contains_key(oid) {
                        return Err(Error::Storage(StorageError::Apply(format!(
                            "delete of missing id {}",
                            oid
                        ))));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeMapper for MemStore {
    fn fetch(&self, oid: &ObjectId) -> Result<Option<NodeRecord>> {
        Ok(self.records.get(oid).map(|entry| entry.value().clone()))
    }

    fn fetch_oids(&self, type_name: &str, criteria: Option<&Criteria>) -> Result<Vec<ObjectId>> {
        let mut oids: Vec<ObjectId> = self
            .records
            .iter()
            .filter(|entry| entry.key().type_name() == type_name)
            .filter(|entry| criteria.map_or(true, |c| c.matches(entry.value())))
            .map(|entry| entry.key().clone())
            .collect();
        // Lexicographic order keeps enumeration stable and restartable
        oids.sort_by_key(|oid| oid.to_string());
        Ok(oids)
    }

    fn current_version(&self, oid: &ObjectId) -> Result<Option<Version>> {
        Ok(self.records.get(oid).map(|entry| entry.value().version))
    }

    fn next_key(&self, type_name: &str) -> Result<u64> {
        let counter = self
            .key_counters
            .entry(type_name.to_string())
            .or_insert_with(|| AtomicU64::new(self.initial_key));
        Ok(counter.fetch_add(1, Ordering::AcqRel))
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<()> {
        let _guard = self.apply_guard.lock();

        // All-or-nothing: reject the whole batch before touching anything
        self.validate(mutations)?;

        for mutation in mutations {
            match mutation {
                Mutation::Create { record } => {
                    let mut record = record.clone();
                    record.version = Version::initial();
                    self.records.insert(record.oid.clone(), record);
                }
                Mutation::Update { record } => {
                    let mut record = record.clone();
                    let current = self
                        .records
                        .get(&record.oid)
                        .map(|entry| entry.value().version)
                        .unwrap_or_else(Version::initial);
                    record.version = current.next();
                    self.records.insert(record.oid.clone(), record);
                }
                Mutation::Delete { oid } => {
                    self.records.remove(oid);
                }
            }
        }
        Ok(())
    }
}

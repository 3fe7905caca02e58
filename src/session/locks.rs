//! Lock management
//!
//! Process-shared lock table guarding concurrent edits to the same entity.
//! The table itself is the only cross-session shared state besides the
//! backing store, and every read or write of it happens under one mutex.
//! Commit validation additionally serializes under [`LockManager::commit_guard`]
//! so two transactions can never both validate the same conflicting id.
//!
//! Locks carry no TTL: an explicit release or process end is the only
//! termination path.

use crate::core::error::{Error, Result};
use crate::core::oid::ObjectId;
use crate::core::types::{Timestamp, Version};
use crate::system::metrics::Metrics;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Acting identity: user plus session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    user: String,
    session_id: String,
}

impl Principal {
    /// Create a principal with an explicit session id
    pub fn new(user: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            session_id: session_id.into(),
        }
    }

    /// Create a principal with a generated session id
    pub fn with_generated_session(user: impl Into<String>) -> Self {
        Self::new(user, uuid::Uuid::new_v4().to_string())
    }

    /// The user name
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.session_id)
    }
}

/// Locking mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Versioned read, validated at commit time
    Optimistic,
    /// Exclusive hold, conflicts surface at acquisition time
    Pessimistic,
}

/// An active lock on one entity
#[derive(Clone, Debug)]
pub struct Lock {
    /// Holder of the lock
    pub principal: Principal,
    /// Target entity
    pub oid: ObjectId,
    /// Locking mode
    pub mode: LockMode,
    /// Version captured at acquisition (optimistic locks)
    pub version: Option<Version>,
    /// Acquisition time
    pub acquired_at: Timestamp,
}

/// Process-shared lock table.
///
/// Invariant: at most one active lock per (entity, mode). Acquisition by a
/// different principal while held fails; re-acquisition by the holder
/// refreshes the captured version.
#[derive(Default)]
pub struct LockManager {
    table: Mutex<HashMap<(ObjectId, LockMode), Lock>>,
    commit_guard: Mutex<()>,
}

impl LockManager {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire or refresh a lock.
    ///
    /// Fails with [`Error::LockConflict`] if a different principal holds an
    /// active lock on the entity in the same mode.
    pub fn acquire(
        &self,
        principal: &Principal,
        oid: &ObjectId,
        mode: LockMode,
        version: Option<Version>,
    ) -> Result<()> {
        let mut table = self.table.lock();
        let key = (oid.clone(), mode);
        if let Some(existing) = table.get(&key) {
            if existing.principal != *principal {
                Metrics::global().locks.lock_conflicts.inc();
                return Err(Error::lock_conflict(format!(
                    "{} is locked by {}",
                    oid, existing.principal
                )));
            }
        }
        table.insert(
            key,
            Lock {
                principal: principal.clone(),
                oid: oid.clone(),
                mode,
                version,
                acquired_at: Timestamp::now(),
            },
        );
        Metrics::global().locks.locks_acquired.inc();
        tracing::debug!(oid = %oid, principal = %principal, ?mode, "lock acquired");
        Ok(())
    }

    /// Release one lock. Idempotent; a lock held by someone else stays put.
    pub fn release(&self, principal: &Principal, oid: &ObjectId, mode: LockMode) {
        let mut table = self.table.lock();
        let key = (oid.clone(), mode);
        if table.get(&key).is_some_and(|l| l.principal == *principal) {
            table.remove(&key);
            tracing::debug!(oid = %oid, principal = %principal, ?mode, "lock released");
        }
    }

    /// Release every lock held by a principal. Idempotent.
    pub fn release_all(&self, principal: &Principal) {
        let mut table = self.table.lock();
        table.retain(|_, lock| lock.principal != *principal);
    }

    /// Current holder of a lock, if any
    pub fn holder(&self, oid: &ObjectId, mode: LockMode) -> Option<Principal> {
        let table = self.table.lock();
        table
            .get(&(oid.clone(), mode))
            .map(|lock| lock.principal.clone())
    }

    /// All locks currently held by a principal
    pub fn locks_held(&self, principal: &Principal) -> Vec<Lock> {
        let table = self.table.lock();
        table
            .values()
            .filter(|lock| lock.principal == *principal)
            .cloned()
            .collect()
    }

    /// Number of active locks
    pub fn lock_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Guard serializing the whole commit validate-and-apply sequence
    pub fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.commit_guard.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> ObjectId {
        ObjectId::parse(s).unwrap()
    }

    #[test]
    fn test_acquire_conflict_and_release() {
        let locks = LockManager::new();
        let alice = Principal::new("alice", "s1");
        let bob = Principal::new("bob", "s2");
        let target = oid("Book:1");

        locks.acquire(&alice, &target, LockMode::Pessimistic, None).unwrap();

        // Second principal fails while the first lock is held
        let err = locks
            .acquire(&bob, &target, LockMode::Pessimistic, None)
            .unwrap_err();
        assert!(matches!(err, Error::LockConflict(_)));

        // After release the second principal succeeds
        locks.release(&alice, &target, LockMode::Pessimistic);
        locks.acquire(&bob, &target, LockMode::Pessimistic, None).unwrap();
        assert_eq!(locks.holder(&target, LockMode::Pessimistic), Some(bob));
    }

    #[test]
    fn test_reacquire_by_holder_refreshes() {
        let locks = LockManager::new();
        let alice = Principal::new("alice", "s1");
        let target = oid("Book:1");

        locks
            .acquire(&alice, &target, LockMode::Optimistic, Some(Version::initial()))
            .unwrap();
        locks
            .acquire(&alice, &target, LockMode::Optimistic, Some(Version::from_u64(3)))
            .unwrap();

        let held = locks.locks_held(&alice);
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].version, Some(Version::from_u64(3)));
    }

    #[test]
    fn test_one_lock_per_mode() {
        let locks = LockManager::new();
        let alice = Principal::new("alice", "s1");
        let bob = Principal::new("bob", "s2");
        let target = oid("Book:1");

        // Different modes do not collide with each other
        locks.acquire(&alice, &target, LockMode::Optimistic, Some(Version::initial())).unwrap();
        locks.acquire(&bob, &target, LockMode::Pessimistic, None).unwrap();
        assert_eq!(locks.lock_count(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let locks = LockManager::new();
        let alice = Principal::new("alice", "s1");
        let bob = Principal::new("bob", "s2");
        let target = oid("Book:1");

        // Releasing nothing is a no-op
        locks.release(&alice, &target, LockMode::Pessimistic);
        locks.release_all(&alice);

        // Releasing someone else's lock is a no-op
        locks.acquire(&bob, &target, LockMode::Pessimistic, None).unwrap();
        locks.release(&alice, &target, LockMode::Pessimistic);
        assert_eq!(locks.holder(&target, LockMode::Pessimistic), Some(bob));
    }

    #[test]
    fn test_release_all() {
        let locks = LockManager::new();
        let alice = Principal::new("alice", "s1");
        locks.acquire(&alice, &oid("Book:1"), LockMode::Pessimistic, None).unwrap();
        locks.acquire(&alice, &oid("Book:2"), LockMode::Optimistic, Some(Version::initial())).unwrap();

        locks.release_all(&alice);
        assert_eq!(locks.lock_count(), 0);
        assert!(locks.locks_held(&alice).is_empty());
    }
}

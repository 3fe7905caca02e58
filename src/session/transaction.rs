//! Transactions
//!
//! A transaction brackets a sequence of persistence operations: mutations
//! are buffered while it is active and applied in a single atomic step at
//! commit, after every optimistic lock has been re-validated against the
//! backing store. The validate-and-apply sequence runs under the lock
//! manager's commit guard, so concurrent transactions cannot both validate
//! the same conflicting entity.

use crate::core::error::{Error, Result};
use crate::core::oid::ObjectId;
use crate::core::types::Version;
use crate::session::locks::{LockManager, Principal};
use crate::storage::factory::SharedMapper;
use crate::storage::mapper::Mutation;
use crate::system::metrics::Metrics;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Transaction lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    /// No transaction bracket open
    NotStarted,
    /// Mutations are being buffered
    Active,
    /// Terminal: buffered mutations were applied atomically
    Committed,
    /// Terminal: buffered mutations were discarded
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxState::NotStarted => "not started",
            TxState::Active => "active",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
        };
        write!(f, "{}", s)
    }
}

/// Buffered unit of work against the backing store
pub struct Transaction {
    state: TxState,
    mutations: Vec<Mutation>,
    optimistic: HashMap<ObjectId, Version>,
    principal: Principal,
    locks: Arc<LockManager>,
    mapper: SharedMapper,
}

impl Transaction {
    /// Create a transaction in the `NotStarted` state
    pub fn new(principal: Principal, locks: Arc<LockManager>, mapper: SharedMapper) -> Self {
        Self {
            state: TxState::NotStarted,
            mutations: Vec::new(),
            optimistic: HashMap::new(),
            principal,
            locks,
            mapper,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Whether mutations are currently being buffered
    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    /// Number of buffered mutations
    pub fn pending_count(&self) -> usize {
        self.mutations.len()
    }

    /// Ids targeted by the buffered mutations
    pub fn pending_oids(&self) -> Vec<ObjectId> {
        self.mutations.iter().map(|m| m.oid().clone()).collect()
    }

    /// Open the transaction bracket.
    ///
    /// Only valid from `NotStarted`; a terminal transaction cannot be
    /// reopened and an active one cannot be nested.
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            TxState::NotStarted => {
                self.state = TxState::Active;
                tracing::debug!(principal = %self.principal, "transaction started");
                Ok(())
            }
            state => Err(Error::tx(format!("cannot begin a {} transaction", state))),
        }
    }

    /// Register an optimistic lock for an entity loaded while active.
    ///
    /// Optimistic locks are transaction-scoped versioned reads: they do not
    /// claim the shared lock table (readers never block readers), and the
    /// captured version is what commit re-validates against. The first
    /// capture per entity wins; re-loads do not move the baseline.
    pub(crate) fn register_loaded(&mut self, oid: ObjectId, version: Version) {
        debug_assert!(self.is_active());
        self.optimistic.entry(oid).or_insert(version);
    }

    /// Buffer a mutation, coalescing with an earlier one for the same id.
    pub(crate) fn record(&mut self, mutation: Mutation) {
        let pos = self
            .mutations
            .iter()
            .position(|m| m.oid() == mutation.oid());
        let Some(pos) = pos else {
            self.mutations.push(mutation);
            return;
        };

        let merged = match (self.mutations.remove(pos), mutation) {
            // Still unpersisted, later saves fold into the create
            (Mutation::Create { .. }, Mutation::Update { record }) => {
                Some(Mutation::Create { record })
            }
            // Created and deleted inside one bracket: nothing to persist
            (Mutation::Create { .. }, Mutation::Delete { .. }) => None,
            // Deleted then re-created: the stored row still exists
            (Mutation::Delete { .. }, Mutation::Create { record }) => {
                Some(Mutation::Update { record })
            }
            (_, latest) => Some(latest),
        };
        if let Some(merged) = merged {
            self.mutations.push(merged);
        }
    }

    /// Drop a buffered create for an id; returns true if one was dropped.
    pub(crate) fn discard_pending_create(&mut self, oid: &ObjectId) -> bool {
        let pos = self
            .mutations
            .iter()
            .position(|m| matches!(m, Mutation::Create { .. }) && m.oid() == oid);
        match pos {
            Some(pos) => {
                self.mutations.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Validate every optimistic lock and apply the buffer atomically.
    ///
    /// Any entity modified by another committed transaction since its lock
    /// was acquired fails the whole commit with [`Error::Conflict`]; the
    /// transaction rolls back and nothing is applied. Backend failures
    /// during the apply likewise leave the transaction rolled back with no
    /// partial apply visible.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(Error::tx(format!("cannot commit a {} transaction", self.state)));
        }

        let started = Instant::now();
        let locks = Arc::clone(&self.locks);
        let _guard = locks.commit_guard();

        let mut conflict = None;
        for (oid, captured) in &self.optimistic {
            let current = self.mapper.current_version(oid)?;
            if current != Some(*captured) {
                let msg = format!(
                    "{} changed since lock acquisition (captured v{}, now {})",
                    oid,
                    captured.as_u64(),
                    current.map_or("gone".to_string(), |v| format!("v{}", v.as_u64())),
                );
                conflict = Some((oid.clone(), msg));
                break;
            }
        }
        if let Some((oid, msg)) = conflict {
            self.abort();
            Metrics::global().transactions.conflicts.inc();
            tracing::warn!(principal = %self.principal, oid = %oid, "commit conflict");
            return Err(Error::conflict(msg));
        }

        match self.mapper.apply(&self.mutations) {
            Ok(()) => {
                let applied = self.mutations.len();
                self.mutations.clear();
                self.optimistic.clear();
                self.locks.release_all(&self.principal);
                self.state = TxState::Committed;
                Metrics::global().transactions.commits.inc();
                Metrics::global()
                    .transactions
                    .commit_duration
                    .observe(started.elapsed().as_secs_f64());
                tracing::debug!(principal = %self.principal, applied, "transaction committed");
                Ok(())
            }
            Err(e) => {
                self.abort();
                tracing::error!(principal = %self.principal, error = %e, "commit apply failed");
                Err(e)
            }
        }
    }

    /// Discard buffered mutations, release locks, move to `RolledBack`.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(Error::tx(format!("cannot rollback a {} transaction", self.state)));
        }
        self.abort();
        Metrics::global().transactions.rollbacks.inc();
        tracing::debug!(principal = %self.principal, "transaction rolled back");
        Ok(())
    }

    fn abort(&mut self) {
        self.mutations.clear();
        self.optimistic.clear();
        self.locks.release_all(&self.principal);
        self.state = TxState::RolledBack;
    }
}

//! Identity map
//!
//! One resident node instance per object id per unit of work. The map is
//! session-scoped and deliberately not a concurrent structure: a session is
//! one logical thread of control, and cross-session state lives in the lock
//! table and the backing store only.

use crate::core::node::NodeHandle;
use crate::core::oid::ObjectId;
use std::collections::HashMap;

/// Session-scoped registry of resident nodes, keyed by object id.
///
/// This is the arena index for the in-memory graph: relations store ids,
/// and the identity map resolves them to live handles.
#[derive(Default)]
pub struct IdentityMap {
    nodes: HashMap<ObjectId, NodeHandle>,
}

impl IdentityMap {
    /// Create an empty identity map
    pub fn new() -> Self {
        Self::default()
    }

    /// Resident handle for an id, if any
    pub fn get(&self, oid: &ObjectId) -> Option<NodeHandle> {
        self.nodes.get(oid).cloned()
    }

    /// Register a handle under its node's id, replacing any previous one
    pub fn register(&mut self, handle: NodeHandle) {
        let oid = handle.read().oid().clone();
        self.nodes.insert(oid, handle);
    }

    /// Drop the resident handle for an id
    pub fn evict(&mut self, oid: &ObjectId) -> Option<NodeHandle> {
        self.nodes.remove(oid)
    }

    /// Check residency
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.nodes.contains_key(oid)
    }

    /// Number of resident nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every resident handle
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

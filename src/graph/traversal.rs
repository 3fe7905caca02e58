//! Depth-first graph traversal
//!
//! Iterators over the resident entity graph. Relations store object ids,
//! so traversal resolves each hop through the identity map and guards
//! against cycles with a visited set over ids: every id is yielded at most
//! once per traversal, which makes cyclic graphs finite to walk. Ids that
//! are not resident are skipped.
//!
//! Two granularities share the same machinery: [`NodeIterator`] yields one
//! handle per node, [`ValueIterator`] yields one `(id, key, value)` triple
//! per attribute.

use crate::core::node::NodeHandle;
use crate::core::oid::ObjectId;
use crate::core::types::{PropertyKey, Value};
use crate::session::identity::IdentityMap;
use std::collections::{HashSet, VecDeque};

/// Depth-first, cycle-guarded iterator at node granularity.
///
/// Lazy and finite; `restart` rewinds to the original roots.
pub struct NodeIterator<'a> {
    identity: &'a IdentityMap,
    roots: Vec<ObjectId>,
    stack: Vec<ObjectId>,
    visited: HashSet<ObjectId>,
}

impl<'a> NodeIterator<'a> {
    /// Create an iterator starting from the given roots
    pub fn new(identity: &'a IdentityMap, roots: Vec<ObjectId>) -> Self {
        let mut iter = Self {
            identity,
            roots,
            stack: Vec::new(),
            visited: HashSet::new(),
        };
        iter.restart();
        iter
    }

    /// Rewind to the original roots, forgetting all visit state
    pub fn restart(&mut self) {
        self.visited.clear();
        self.stack = self.roots.iter().rev().cloned().collect();
    }
}

impl<'a> Iterator for NodeIterator<'a> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(oid) = self.stack.pop() {
            if !self.visited.insert(oid.clone()) {
                continue;
            }
            let Some(handle) = self.identity.get(&oid) else {
                continue;
            };
            // Push related ids in reverse so the first relation target is
            // visited next (depth-first, relation order preserved)
            let related: Vec<ObjectId> =
                handle.read().related_oids().cloned().collect();
            for target in related.into_iter().rev() {
                if !self.visited.contains(&target) {
                    self.stack.push(target);
                }
            }
            return Some(handle);
        }
        None
    }
}

/// Depth-first, cycle-guarded iterator at attribute granularity.
///
/// Wraps a [`NodeIterator`] and flattens each visited node into its
/// attributes, sorted by key for a deterministic order.
pub struct ValueIterator<'a> {
    nodes: NodeIterator<'a>,
    pending: VecDeque<(ObjectId, PropertyKey, Value)>,
}

impl<'a> ValueIterator<'a> {
    /// Create an attribute iterator over the same traversal as `nodes`
    pub fn new(nodes: NodeIterator<'a>) -> Self {
        Self {
            nodes,
            pending: VecDeque::new(),
        }
    }

    /// Rewind to the original roots, forgetting all visit state
    pub fn restart(&mut self) {
        self.pending.clear();
        self.nodes.restart();
    }
}

impl<'a> Iterator for ValueIterator<'a> {
    type Item = (ObjectId, PropertyKey, Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.pending.pop_front() {
                return Some(triple);
            }
            let handle = self.nodes.next()?;
            let node = handle.read();
            let oid = node.oid().clone();
            let mut keys: Vec<&PropertyKey> = node.attributes().keys().collect();
            keys.sort();
            for key in keys {
                let value = node.attributes()[key].clone();
                self.pending.push_back((oid.clone(), key.clone(), value));
            }
        }
    }
}

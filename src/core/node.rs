//! Entity node implementation
//!
//! A `Node` is a mutable entity instance: its object id, an attribute map
//! and a list of named relations. Relations store target object ids only —
//! never owned node references — so parent/child back-references cannot form
//! ownership cycles; the in-memory graph is an arena keyed by id with the
//! identity map as the arena index.

use crate::core::oid::ObjectId;
use crate::core::types::{PropertyKey, Value, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to an entity node.
///
/// The identity map hands out exactly one handle per object id per unit of
/// work; "same instance" is `Arc::ptr_eq` on this handle.
pub type NodeHandle = Arc<RwLock<Node>>;

/// A named, ordered edge set to related entities
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation name (e.g. `books`, `author`)
    pub name: String,
    /// Target object ids in insertion order
    pub targets: Vec<ObjectId>,
}

/// Persistence state of a node instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Never persisted; saving buffers a create
    New,
    /// Backed by a stored record; saving buffers an update
    Persistent,
}

/// Entity node
#[derive(Clone, Debug)]
pub struct Node {
    /// Unique object identifier
    oid: ObjectId,
    /// Attribute values
    attributes: HashMap<PropertyKey, Value>,
    /// Named relations in declaration order
    relations: Vec<Relation>,
    /// Persisted version this instance was built from
    version: Version,
    /// Whether this instance is backed by a stored record
    state: NodeState,
}

impl Node {
    /// Create a new node for the given id with no attributes or relations
    pub fn new(oid: ObjectId) -> Self {
        Self {
            oid,
            attributes: HashMap::new(),
            relations: Vec::new(),
            version: Version::initial(),
            state: NodeState::New,
        }
    }

    /// The node's object id
    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }

    /// The node's type name
    pub fn type_name(&self) -> &str {
        self.oid.type_name()
    }

    /// Persisted version this instance was built from
    pub fn version(&self) -> Version {
        self.version
    }

    /// Record the persisted version (set by the loader)
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Persistence state of this instance
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Record the persistence state (set by the loader and at commit)
    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    /// Set an attribute value
    pub fn set_attribute(&mut self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Get an attribute value
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(&PropertyKey::new(key))
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(&PropertyKey::new(key))
    }

    /// All attributes
    pub fn attributes(&self) -> &HashMap<PropertyKey, Value> {
        &self.attributes
    }

    /// Targets of a named relation, empty if the relation does not exist
    pub fn relation(&self, name: &str) -> &[ObjectId] {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.targets.as_slice())
            .unwrap_or(&[])
    }

    /// All relations in declaration order
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Append a child edge under the named relation.
    ///
    /// Mutates the in-memory edge set only; persistence is not cascaded.
    /// Duplicate targets within one relation are kept out.
    pub fn add_child(&mut self, relation: &str, child: ObjectId) {
        self.add_related(relation, child)
    }

    /// Append a parent edge under the named relation.
    ///
    /// Parents and children are both plain named relations; the distinction
    /// is the caller's schema, not the node's.
    pub fn add_parent(&mut self, relation: &str, parent: ObjectId) {
        self.add_related(relation, parent)
    }

    fn add_related(&mut self, relation: &str, target: ObjectId) {
        match self.relations.iter_mut().find(|r| r.name == relation) {
            Some(rel) => {
                if !rel.targets.contains(&target) {
                    rel.targets.push(target);
                }
            }
            None => self.relations.push(Relation {
                name: relation.to_string(),
                targets: vec![target],
            }),
        }
    }

    /// Remove a target from the named relation; returns true if an edge was removed
    pub fn remove_related(&mut self, relation: &str, target: &ObjectId) -> bool {
        if let Some(rel) = self.relations.iter_mut().find(|r| r.name == relation) {
            let before = rel.targets.len();
            rel.targets.retain(|t| t != target);
            return rel.targets.len() != before;
        }
        false
    }

    /// Replace the full relation list (used when rebuilding from a record)
    pub fn set_relations(&mut self, relations: Vec<Relation>) {
        self.relations = relations;
    }

    /// Object ids of every relation target, in relation order
    pub fn related_oids(&self) -> impl Iterator<Item = &ObjectId> {
        self.relations.iter().flat_map(|r| r.targets.iter())
    }

    /// Wrap this node into a shared handle
    pub fn into_handle(self) -> NodeHandle {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> ObjectId {
        ObjectId::parse(s).unwrap()
    }

    #[test]
    fn test_attributes() {
        let mut node = Node::new(oid("Book:1"));
        node.set_attribute("title", "Rust in Practice");
        node.set_attribute("pages", 412i64);

        assert_eq!(node.attribute("title").unwrap().as_str(), Some("Rust in Practice"));
        assert_eq!(node.attribute("pages").unwrap().as_int(), Some(412));
        assert!(node.attribute("missing").is_none());

        assert!(node.remove_attribute("pages").is_some());
        assert!(node.attribute("pages").is_none());
    }

    #[test]
    fn test_relation_ordering() {
        let mut node = Node::new(oid("Publisher:1"));
        node.add_child("books", oid("Book:2"));
        node.add_child("books", oid("Book:1"));
        node.add_child("books", oid("Book:3"));

        let books: Vec<String> = node.relation("books").iter().map(|o| o.to_string()).collect();
        assert_eq!(books, vec!["Book:2", "Book:1", "Book:3"]);
    }

    #[test]
    fn test_relation_no_duplicates() {
        let mut node = Node::new(oid("Publisher:1"));
        node.add_child("books", oid("Book:1"));
        node.add_child("books", oid("Book:1"));
        assert_eq!(node.relation("books").len(), 1);
    }

    #[test]
    fn test_missing_relation_is_empty() {
        let node = Node::new(oid("Publisher:1"));
        assert!(node.relation("books").is_empty());
    }

    #[test]
    fn test_remove_related() {
        let mut node = Node::new(oid("Publisher:1"));
        node.add_child("books", oid("Book:1"));
        assert!(node.remove_related("books", &oid("Book:1")));
        assert!(!node.remove_related("books", &oid("Book:1")));
        assert!(node.relation("books").is_empty());
    }

    #[test]
    fn test_parent_and_child_edges() {
        let mut book = Node::new(oid("Book:1"));
        book.add_parent("publisher", oid("Publisher:1"));
        book.add_child("chapters", oid("Chapter:1"));

        assert_eq!(book.relation("publisher"), &[oid("Publisher:1")]);
        let all: Vec<&ObjectId> = book.related_oids().collect();
        assert_eq!(all.len(), 2);
    }
}

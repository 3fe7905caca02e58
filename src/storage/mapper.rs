//! Storage mapper capability
//!
//! The engine talks to its backing store exclusively through the
//! [`NodeMapper`] trait: fetch raw records, enumerate ids, allocate keys and
//! apply mutation batches. Backends are free to block; calls are treated as
//! opaque external I/O by the layers above.

use crate::core::error::Result;
use crate::core::node::{Node, NodeState, Relation};
use crate::core::oid::ObjectId;
use crate::core::types::{PropertyKey, Value, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw attribute/relation data for one entity as a backend stores it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Entity id
    pub oid: ObjectId,
    /// Attribute values
    pub attributes: HashMap<PropertyKey, Value>,
    /// Named relations with target ids in order
    pub relations: Vec<Relation>,
    /// Persisted version, bumped by the backend on every applied update
    pub version: Version,
}

impl NodeRecord {
    /// Snapshot a node into a record (the version travels along)
    pub fn from_node(node: &Node) -> Self {
        Self {
            oid: node.oid().clone(),
            attributes: node.attributes().clone(),
            relations: node.relations().to_vec(),
            version: node.version(),
        }
    }

    /// Rebuild a node from this record
    pub fn into_node(self) -> Node {
        let mut node = Node::new(self.oid);
        for (key, value) in self.attributes {
            node.set_attribute(key, value);
        }
        node.set_relations(self.relations);
        node.set_version(self.version);
        node.set_state(NodeState::Persistent);
        node
    }
}

/// A single buffered persistence operation
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Persist a new entity
    Create {
        /// Full record of the new entity
        record: NodeRecord,
    },
    /// Overwrite an existing entity
    Update {
        /// Full record replacing the stored one
        record: NodeRecord,
    },
    /// Remove an entity
    Delete {
        /// Id of the entity to remove
        oid: ObjectId,
    },
}

impl Mutation {
    /// The entity id this mutation targets
    pub fn oid(&self) -> &ObjectId {
        match self {
            Mutation::Create { record } | Mutation::Update { record } => &record.oid,
            Mutation::Delete { oid } => oid,
        }
    }
}

/// Conjunction of attribute equality terms for id enumeration
#[derive(Clone, Debug, Default)]
pub struct Criteria {
    terms: Vec<(PropertyKey, Value)>,
}

impl Criteria {
    /// Empty criteria matching every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality term; all terms must match
    pub fn with(mut self, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Self {
        self.terms.push((key.into(), value.into()));
        self
    }

    /// Check a record against all terms
    pub fn matches(&self, record: &NodeRecord) -> bool {
        self.terms
            .iter()
            .all(|(key, value)| record.attributes.get(key) == Some(value))
    }
}

/// Pluggable storage backend capability.
///
/// `apply` is the commit surface: a batch is applied all-or-nothing, and a
/// failed precondition leaves the store untouched.
pub trait NodeMapper: Send + Sync {
    /// Fetch the stored record for an id, `None` if not persisted
    fn fetch(&self, oid: &ObjectId) -> Result<Option<NodeRecord>>;

    /// Enumerate ids of a type matching the criteria, sorted by wire string
    fn fetch_oids(&self, type_name: &str, criteria: Option<&Criteria>) -> Result<Vec<ObjectId>>;

    /// Current persisted version of an id, `None` if not persisted
    fn current_version(&self, oid: &ObjectId) -> Result<Option<Version>>;

    /// Allocate the next primary key for a type (monotonic per type)
    fn next_key(&self, type_name: &str) -> Result<u64>;

    /// Apply a mutation batch atomically, all-or-nothing
    fn apply(&self, mutations: &[Mutation]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_node_round_trip() {
        let mut node = Node::new(ObjectId::parse("Book:1").unwrap());
        node.set_attribute("title", "Systems");
        node.add_parent("publisher", ObjectId::parse("Publisher:1").unwrap());
        node.set_version(Version::from_u64(7));

        let record = NodeRecord::from_node(&node);
        let back = record.into_node();

        assert_eq!(back.oid(), node.oid());
        assert_eq!(back.attribute("title"), node.attribute("title"));
        assert_eq!(back.relation("publisher"), node.relation("publisher"));
        assert_eq!(back.version(), Version::from_u64(7));
    }

    #[test]
    fn test_criteria_matching() {
        let mut node = Node::new(ObjectId::parse("Book:1").unwrap());
        node.set_attribute("lang", "en");
        node.set_attribute("pages", 100i64);
        let record = NodeRecord::from_node(&node);

        assert!(Criteria::new().matches(&record));
        assert!(Criteria::new().with("lang", "en").matches(&record));
        assert!(Criteria::new().with("lang", "en").with("pages", 100i64).matches(&record));
        assert!(!Criteria::new().with("lang", "de").matches(&record));
        assert!(!Criteria::new().with("missing", "x").matches(&record));
    }

    #[test]
    fn test_mutation_oid() {
        let oid = ObjectId::parse("Book:1").unwrap();
        let record = NodeRecord::from_node(&Node::new(oid.clone()));
        assert_eq!(Mutation::Create { record: record.clone() }.oid(), &oid);
        assert_eq!(Mutation::Update { record }.oid(), &oid);
        assert_eq!(Mutation::Delete { oid: oid.clone() }.oid(), &oid);
    }
}

//! Type registry for factory-based node instantiation
//!
//! Entity types are registered at startup with their key arity and a factory
//! closure; instantiation is a plain map lookup by type name. There is no
//! runtime reflection anywhere in the engine.

use crate::core::error::{Error, Result};
use crate::core::node::Node;
use crate::core::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory producing a default-valued node for a freshly allocated id
pub type NodeFactory = Arc<dyn Fn(ObjectId) -> Node + Send + Sync>;

struct TypeEntry {
    key_arity: usize,
    factory: NodeFactory,
}

/// Registry mapping entity type names to their schema arity and factory.
///
/// Populated once at startup and shared read-only between sessions.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeEntry>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type with its key arity and factory closure.
    ///
    /// Re-registering a name replaces the previous entry.
    pub fn register<F>(&mut self, type_name: impl Into<String>, key_arity: usize, factory: F)
    where
        F: Fn(ObjectId) -> Node + Send + Sync + 'static,
    {
        self.types.insert(
            type_name.into(),
            TypeEntry {
                key_arity,
                factory: Arc::new(factory),
            },
        );
    }

    /// Register a type with a single-component key and the default factory
    pub fn register_default(&mut self, type_name: impl Into<String>) {
        self.register(type_name, 1, Node::new);
    }

    /// Check whether a type name is known
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// All registered type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Key arity declared for a type
    pub fn key_arity(&self, type_name: &str) -> Result<usize> {
        self.types
            .get(type_name)
            .map(|e| e.key_arity)
            .ok_or_else(|| Error::config(format!("unregistered type: {}", type_name)))
    }

    /// Validate an id against the declared arity of its type.
    ///
    /// Wrong arity is a format violation, not a configuration one: the id
    /// itself does not match the type's schema.
    pub fn check_arity(&self, oid: &ObjectId) -> Result<()> {
        let expected = self.key_arity(oid.type_name())?;
        if oid.arity() != expected {
            return Err(Error::format(format!(
                "{}: expected {} key component(s), got {}",
                oid,
                expected,
                oid.arity()
            )));
        }
        Ok(())
    }

    /// Build a default-valued node for the given id via the type's factory
    pub fn instantiate(&self, oid: ObjectId) -> Result<Node> {
        let entry = self
            .types
            .get(oid.type_name())
            .ok_or_else(|| Error::config(format!("unregistered type: {}", oid.type_name())))?;
        Ok((entry.factory)(oid))
    }
}

//! Composite object identifiers
//!
//! Every persisted entity is named by an `ObjectId`: a type name plus an
//! ordered list of primary-key components, serialized as `Type:k1:k2:...`.
//! The string form is the wire format used at every API boundary, so parsing
//! and formatting are exact inverses of each other.

use crate::core::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Separator between the type name and key components in the wire form
pub const OID_SEPARATOR: char = ':';

/// Composite identifier for a persisted entity.
///
/// Immutable value type: a non-empty type name and at least one key
/// component. Components are opaque strings compared positionally, with no
/// numeric coercion. Two ids are equal iff the type and every component
/// match.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    type_name: Arc<str>,
    keys: Vec<Arc<str>>,
}

impl ObjectId {
    /// Create an id from a type name and key components.
    ///
    /// Fails with [`Error::Format`] if the type is empty, no components are
    /// given, or any component is empty.
    pub fn new(type_name: impl Into<Arc<str>>, keys: Vec<String>) -> Result<Self> {
        let type_name = type_name.into();
        if type_name.is_empty() {
            return Err(Error::format("empty type name"));
        }
        if keys.is_empty() {
            return Err(Error::format(format!("{}: no key components", type_name)));
        }
        if keys.iter().any(|k| k.is_empty()) {
            return Err(Error::format(format!("{}: empty key component", type_name)));
        }
        Ok(Self {
            type_name,
            keys: keys.into_iter().map(Arc::from).collect(),
        })
    }

    /// Shorthand for the common single-key case
    pub fn with_key(type_name: impl Into<Arc<str>>, key: impl Into<String>) -> Result<Self> {
        Self::new(type_name, vec![key.into()])
    }

    /// Parse the wire form `Type:k1:k2:...`.
    ///
    /// Rejects empty input, an empty type name, zero components, and empty
    /// components. A successful parse round-trips exactly through
    /// [`ObjectId::to_string`].
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(OID_SEPARATOR);
        let type_name = parts.next().unwrap_or_default();
        if type_name.is_empty() {
            return Err(Error::format(format!("'{}': empty type name", s)));
        }
        let keys: Vec<&str> = parts.collect();
        if keys.is_empty() {
            return Err(Error::format(format!("'{}': no key components", s)));
        }
        if keys.iter().any(|k| k.is_empty()) {
            return Err(Error::format(format!("'{}': empty key component", s)));
        }
        Ok(Self {
            type_name: Arc::from(type_name),
            keys: keys.into_iter().map(Arc::from).collect(),
        })
    }

    /// Check whether a string is a well-formed object id. Never fails.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// The entity type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The ordered key components
    pub fn keys(&self) -> &[Arc<str>] {
        &self.keys
    }

    /// Number of key components
    pub fn arity(&self) -> usize {
        self.keys.len()
    }

    /// First key component, for the common single-key case
    pub fn first_key(&self) -> &str {
        &self.keys[0]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        for key in &self.keys {
            write!(f, "{}{}", OID_SEPARATOR, key)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Serialized as the wire string on every boundary
impl serde::Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::parse(&s).map_err(serde::de::Error::custom)
    }
}

//! Core type definitions for the entity graph engine
//!
//! Attribute values, interned property keys, version counters and the
//! build-depth policy that bounds eager relation loading.

use crate::core::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Compact attribute key using interned strings for efficiency
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(Arc<str>);

/// Version number for optimistic concurrency control
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Version(u64);

/// Timestamp type optimized for ordering and comparison
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Timestamp(u64);

/// Policy controlling how many relation hops are eagerly materialized when
/// loading an entity.
///
/// `Infinite` relies on the identity-map cycle guard for termination rather
/// than unbounded recursion; numeric depths decrement at each hop and stop
/// at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildDepth {
    /// Load the entity itself, no relations
    Single,
    /// Load the full reachable graph (cycle-guarded)
    Infinite,
    /// Load up to N relation hops
    Depth(u32),
}

/// Attribute value type
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// String value with cheap cloning
    String(Arc<str>),
    /// Binary data
    Bytes(Vec<u8>),
    /// Reference to another entity
    ObjectRef(ObjectId),
}

impl PropertyKey {
    /// Create a new property key
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Get string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyKey({})", self.0)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl serde::Serialize for PropertyKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for PropertyKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(PropertyKey(s.into()))
    }
}

impl Version {
    /// Create initial version
    pub fn initial() -> Self {
        Self(1)
    }

    /// Increment version
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Get version number
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Create from u64
    pub fn from_u64(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

impl Timestamp {
    /// Create timestamp from current time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self(nanos)
    }

    /// Create from nanoseconds since epoch
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get nanoseconds since epoch
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms)", self.as_millis())
    }
}

impl BuildDepth {
    /// Depth to use for the next relation hop, or `None` to stop descending.
    pub fn descend(&self) -> Option<BuildDepth> {
        match self {
            BuildDepth::Single => None,
            BuildDepth::Infinite => Some(BuildDepth::Infinite),
            BuildDepth::Depth(0) => None,
            BuildDepth::Depth(n) => Some(BuildDepth::Depth(n - 1)),
        }
    }
}

// Value implementations
impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get value as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get value as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get value as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get value as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get value as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get value as an entity reference
    pub fn as_object_ref(&self) -> Option<&ObjectId> {
        match self {
            Value::ObjectRef(oid) => Some(oid),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a - b).abs() < f64::EPSILON,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::ObjectRef(a), Value::ObjectRef(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

// Convenient constructors
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Value::ObjectRef(oid)
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::ObjectRef(oid) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("object_ref", &oid.to_string())?;
                map.end()
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde_json::Value as JsonValue;
        let json_value = JsonValue::deserialize(deserializer)?;

        Ok(match json_value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            JsonValue::String(s) => Value::String(s.into()),
            JsonValue::Object(obj) => {
                // Only the object_ref envelope is a recognized object form
                match obj.get("object_ref").and_then(|v| v.as_str()) {
                    Some(s) => Value::ObjectRef(
                        ObjectId::parse(s).map_err(serde::de::Error::custom)?,
                    ),
                    None => {
                        return Err(serde::de::Error::custom(
                            "expected an object_ref envelope",
                        ))
                    }
                }
            }
            JsonValue::Array(_) => {
                return Err(serde::de::Error::custom("array values are not supported"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_depth_descend() {
        assert_eq!(BuildDepth::Single.descend(), None);
        assert_eq!(BuildDepth::Depth(0).descend(), None);
        assert_eq!(BuildDepth::Depth(2).descend(), Some(BuildDepth::Depth(1)));
        assert_eq!(BuildDepth::Infinite.descend(), Some(BuildDepth::Infinite));
    }

    #[test]
    fn test_version_monotonic() {
        let v = Version::initial();
        assert_eq!(v.as_u64(), 1);
        assert!(v.next() > v);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(42i64).as_int(), Some(42));
        assert_eq!(Value::from("title").as_str(), Some("title"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(42i64).as_str(), None);
    }

    #[test]
    fn test_value_object_ref_round_trip() {
        let oid = ObjectId::parse("Book:1").unwrap();
        let value = Value::from(oid.clone());
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_object_ref(), Some(&oid));
    }
}

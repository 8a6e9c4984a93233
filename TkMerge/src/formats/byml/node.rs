//! BYML node definitions

use indexmap::IndexMap;

use crate::diff::ArrayChangelog;
use crate::error::Result;

use super::{
    NODE_ARRAY, NODE_BINARY, NODE_BOOL, NODE_CHANGELOG, NODE_DOUBLE, NODE_FLOAT, NODE_HASH_MAP32,
    NODE_HASH_MAP64, NODE_INT, NODE_INT64, NODE_MAP, NODE_NULL, NODE_REMOVE, NODE_STRING,
    NODE_UINT, NODE_UINT64,
};

/// A BYML tree node
#[derive(Debug, Clone, Default)]
pub enum Byml {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Float(f32),
    UInt(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Byml>),
    Map(IndexMap<String, Byml>),
    HashMap32(IndexMap<u32, Byml>),
    HashMap64(IndexMap<u64, Byml>),
    /// Reserved: this node is an array changelog, not data
    Changelog(Box<ArrayChangelog>),
    /// Reserved: the map key holding this node was removed
    Remove,
}

impl PartialEq for Byml {
    /// Structural equality; floats compare by bit pattern so `NaN == NaN`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Remove, Self::Remove) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::UInt64(a), Self::UInt64(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::HashMap32(a), Self::HashMap32(b)) => a == b,
            (Self::HashMap64(a), Self::HashMap64(b)) => a == b,
            (Self::Changelog(a), Self::Changelog(b)) => a == b,
            _ => false,
        }
    }
}

impl Byml {
    /// Parse a BYML document.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        super::parse_byml_bytes(data)
    }

    /// Serialize to a BYML document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        super::serialize_byml(self)
    }

    /// Node type tag as written to disk
    #[must_use]
    pub fn node_type(&self) -> u8 {
        match self {
            Self::Null => NODE_NULL,
            Self::Bool(_) => NODE_BOOL,
            Self::Int(_) => NODE_INT,
            Self::Float(_) => NODE_FLOAT,
            Self::UInt(_) => NODE_UINT,
            Self::Int64(_) => NODE_INT64,
            Self::UInt64(_) => NODE_UINT64,
            Self::Double(_) => NODE_DOUBLE,
            Self::String(_) => NODE_STRING,
            Self::Binary(_) => NODE_BINARY,
            Self::Array(_) => NODE_ARRAY,
            Self::Map(_) => NODE_MAP,
            Self::HashMap32(_) => NODE_HASH_MAP32,
            Self::HashMap64(_) => NODE_HASH_MAP64,
            Self::Changelog(_) => NODE_CHANGELOG,
            Self::Remove => NODE_REMOVE,
        }
    }

    /// Human-readable type name
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::UInt(_) => "UInt",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::Binary(_) => "Binary",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::HashMap32(_) => "HashMap32",
            Self::HashMap64(_) => "HashMap64",
            Self::Changelog(_) => "Changelog",
            Self::Remove => "Remove",
        }
    }

    /// Whether this node is a diff marker rather than data
    #[must_use]
    pub fn is_changelog(&self) -> bool {
        matches!(self, Self::Changelog(_) | Self::Remove)
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Map(_) | Self::HashMap32(_) | Self::HashMap64(_)
        )
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Byml>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Byml>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<Byml>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Byml>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer node widened to `u64`
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v as u64),
            Self::UInt(v) => Some(u64::from(*v)),
            Self::Int64(v) => Some(*v as u64),
            Self::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Look up a string-keyed map entry
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Byml> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Build a string-keyed map from pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Byml)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for Byml {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Byml {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Byml {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<u64> for Byml {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}

impl From<f32> for Byml {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Byml {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Byml {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Byml>> for Byml {
    fn from(value: Vec<Byml>) -> Self {
        Self::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_bitwise_equality() {
        assert_eq!(Byml::Float(f32::NAN), Byml::Float(f32::NAN));
        assert_ne!(Byml::Float(0.0), Byml::Float(-0.0));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = Byml::map([("A", Byml::Int(1)), ("B", Byml::Int(2))]);
        let b = Byml::map([("B", Byml::Int(2)), ("A", Byml::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_changelog_markers() {
        assert!(Byml::Remove.is_changelog());
        assert!(!Byml::Null.is_changelog());
        assert_eq!(Byml::Remove.node_type(), super::super::NODE_REMOVE);
    }
}

//! Core types for diff and merge operations

use std::fmt;

use crate::error::{Error, Result};
use crate::formats::byml::Byml;

/// Options for diff operations
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Record keys/elements present in vanilla but missing from the source
    pub emit_removals: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { emit_removals: true }
    }
}

impl DiffOptions {
    /// Options used to fold colliding insertions into each other: absent fields are kept.
    #[must_use]
    pub fn union() -> Self {
        Self {
            emit_removals: false,
        }
    }
}

/// Operation recorded for one array slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChangeKind {
    /// Element was added
    Add = 0,
    /// Element was modified
    Edit = 1,
    /// Element was removed
    Remove = 2,
}

impl ChangeKind {
    /// Parse the wire value.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Add),
            1 => Ok(Self::Edit),
            2 => Ok(Self::Remove),
            _ => Err(Error::structure(
                "array changelog",
                format!("invalid change kind {value}"),
            )),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Remove => write!(f, "-"),
            Self::Edit => write!(f, "~"),
        }
    }
}

/// A hashable identity value taken from a keyed array element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    String(String),
}

impl KeyValue {
    /// Integer identity used by hash-keyed arrays (32- or 64-bit integers only).
    pub fn from_hash_node(field: &str, node: &Byml) -> Result<Self> {
        match node {
            Byml::Int(v) => Ok(Self::I32(*v)),
            Byml::UInt(v) => Ok(Self::U32(*v)),
            Byml::Int64(v) => Ok(Self::I64(*v)),
            Byml::UInt64(v) => Ok(Self::U64(*v)),
            other => Err(Error::UnsupportedKeyType {
                field: field.to_string(),
                found: other.type_name(),
            }),
        }
    }

    /// Identity used by named-key arrays (integers or strings).
    pub fn from_named_node(field: &str, node: &Byml) -> Result<Self> {
        match node {
            Byml::String(s) => Ok(Self::String(s.clone())),
            other => Self::from_hash_node(field, other),
        }
    }

    /// Stable bytes used when hashing the key into a table index.
    #[must_use]
    pub fn hash_bytes(&self) -> Vec<u8> {
        match self {
            Self::I32(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::I64(v) => v.to_le_bytes().to_vec(),
            Self::U64(v) => v.to_le_bytes().to_vec(),
            Self::String(s) => s.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "0x{v:08X}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "0x{v:016X}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// How elements of an array are identified across versions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKeySpec {
    /// Elements are identified by position
    Positional,
    /// Elements are identified by an integer hash field
    Hash {
        /// Field holding the hash
        field: String,
    },
    /// Elements are identified by one or two named fields
    Named {
        /// First key field
        primary: String,
        /// Optional second key field (composite key)
        secondary: Option<String>,
    },
}

impl ArrayKeySpec {
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        !matches!(self, Self::Positional)
    }

    /// Extract the key of one element.
    ///
    /// Returns `Ok(None)` when a key field is missing or the element is not a map.
    pub fn key_of(&self, node: &Byml) -> Result<Option<(KeyValue, Option<KeyValue>)>> {
        let Some(map) = node.as_map() else {
            return Ok(None);
        };
        match self {
            Self::Positional => Ok(None),
            Self::Hash { field } => match map.get(field) {
                Some(value) => Ok(Some((KeyValue::from_hash_node(field, value)?, None))),
                None => Ok(None),
            },
            Self::Named { primary, secondary } => {
                let Some(first) = map.get(primary) else {
                    return Ok(None);
                };
                let first = KeyValue::from_named_node(primary, first)?;
                let second = match secondary {
                    Some(name) => match map.get(name) {
                        Some(value) => Some(KeyValue::from_named_node(name, value)?),
                        None => return Ok(None),
                    },
                    None => None,
                };
                Ok(Some((first, second)))
            }
        }
    }
}

/// One recorded change to an array
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayChange {
    /// Vanilla index for every kind; an `Add` is inserted before this index
    pub position: usize,
    /// Operation
    pub kind: ChangeKind,
    /// Literal value (`Add`), nested changelog or new value (`Edit`), `Null` (`Remove`)
    pub value: Byml,
    /// Primary key for keyed arrays
    pub primary_key: Option<KeyValue>,
    /// Secondary key for composite keyed arrays
    pub secondary_key: Option<KeyValue>,
}

impl ArrayChange {
    #[must_use]
    pub fn add(position: usize, value: Byml) -> Self {
        Self {
            position,
            kind: ChangeKind::Add,
            value,
            primary_key: None,
            secondary_key: None,
        }
    }

    #[must_use]
    pub fn edit(position: usize, value: Byml) -> Self {
        Self {
            position,
            kind: ChangeKind::Edit,
            value,
            primary_key: None,
            secondary_key: None,
        }
    }

    #[must_use]
    pub fn remove(position: usize) -> Self {
        Self {
            position,
            kind: ChangeKind::Remove,
            value: Byml::Null,
            primary_key: None,
            secondary_key: None,
        }
    }

    /// Attach a key to this change.
    #[must_use]
    pub fn keyed(mut self, key: (KeyValue, Option<KeyValue>)) -> Self {
        self.primary_key = Some(key.0);
        self.secondary_key = key.1;
        self
    }

    /// Key pair, if this change is keyed.
    #[must_use]
    pub fn key(&self) -> Option<(KeyValue, Option<KeyValue>)> {
        self.primary_key
            .clone()
            .map(|primary| (primary, self.secondary_key.clone()))
    }
}

impl fmt::Display for ArrayChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind, self.position)?;
        if let Some(key) = &self.primary_key {
            write!(f, " key={key}")?;
        }
        if let Some(key) = &self.secondary_key {
            write!(f, "/{key}")?;
        }
        Ok(())
    }
}

/// The diff of one array against its vanilla counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayChangelog {
    /// Identity scheme used by every keyed change
    pub key: ArrayKeySpec,
    /// Recorded changes, in the order the strategy emitted them
    pub changes: Vec<ArrayChange>,
}

impl ArrayChangelog {
    #[must_use]
    pub fn new(key: ArrayKeySpec) -> Self {
        Self {
            key,
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn push(&mut self, change: ArrayChange) {
        self.changes.push(change);
    }

    /// Check the keyed/positional invariant.
    ///
    /// Positional changelogs never carry keys. Keyed changelogs carry a key on
    /// every `Edit`/`Remove`; only `Add` may be keyless (missing key field fallback).
    pub fn validate(&self) -> Result<()> {
        let keyed = self.key.is_keyed();
        for change in &self.changes {
            let has_key = change.primary_key.is_some();
            let valid = if keyed {
                has_key || change.kind == ChangeKind::Add
            } else {
                !has_key && change.secondary_key.is_none()
            };
            if !valid {
                return Err(Error::MixedArrayChangelog);
            }
        }
        Ok(())
    }
}

impl fmt::Display for ArrayChangelog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{change}")?;
        }
        Ok(())
    }
}

/// One step of a path from the root of a tree to a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Hash32(u32),
    Hash64(u64),
    Index(usize),
}

/// Path to a node in a tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    /// Path segments from root to target
    pub segments: Vec<PathSegment>,
}

impl NodePath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    #[must_use]
    pub fn with_segment(&self, segment: PathSegment) -> Self {
        let mut new = self.clone();
        new.push(segment);
        new
    }

    #[must_use]
    pub fn with_index(&self, index: usize) -> Self {
        self.with_segment(PathSegment::Index(index))
    }

    #[must_use]
    pub fn with_key(&self, key: &str) -> Self {
        self.with_segment(PathSegment::Key(key.to_string()))
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Name of the closest enclosing map key, used to pick array strategies.
    #[must_use]
    pub fn last_key(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(key) => Some(key.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write!(f, "/{key}")?,
                PathSegment::Hash32(hash) => write!(f, "/0x{hash:08X}")?,
                PathSegment::Hash64(hash) => write!(f, "/0x{hash:016X}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_mixed() {
        let mut positional = ArrayChangelog::new(ArrayKeySpec::Positional);
        positional.push(ArrayChange::edit(0, Byml::Int(1)).keyed((KeyValue::U32(1), None)));
        assert!(matches!(positional.validate(), Err(Error::MixedArrayChangelog)));

        let mut keyed = ArrayChangelog::new(ArrayKeySpec::Hash {
            field: "Hash".to_string(),
        });
        keyed.push(ArrayChange::add(3, Byml::Int(1)));
        assert!(keyed.validate().is_ok());
        keyed.push(ArrayChange::remove(0));
        assert!(keyed.validate().is_err());
    }

    #[test]
    fn test_node_path_display() {
        let path = NodePath::root().with_key("Actors").with_index(2).with_key("Name");
        assert_eq!(path.to_string(), "/Actors[2]/Name");
        assert_eq!(path.last_key(), Some("Name"));
    }

    #[test]
    fn test_hash_key_rejects_strings() {
        let err = KeyValue::from_hash_node("Hash", &Byml::String("x".into())).unwrap_err();
        assert!(matches!(err, Error::UnsupportedKeyType { .. }));
    }
}

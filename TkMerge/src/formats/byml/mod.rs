//! BYML tree format
//!
//! The in-memory tree ([`Byml`]) is what every diff strategy operates on.
//! Two reserved node types mark a node as a diff rather than data:
//! [`Byml::Changelog`] (an array changelog) and [`Byml::Remove`] (a map key
//! removed relative to vanilla). Code that treats a node as data must check
//! [`Byml::is_changelog`] first.
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

mod node;
mod reader;
mod writer;

pub use node::Byml;
pub use reader::{parse_byml_bytes, read_byml};
pub use writer::{serialize_byml, write_byml};

/// BYML magic bytes
pub const MAGIC: [u8; 2] = *b"YB";

/// Supported BYML version
pub const VERSION: u16 = 7;

// Node type tags
pub(crate) const NODE_STRING: u8 = 0xA0;
pub(crate) const NODE_BINARY: u8 = 0xA1;
pub(crate) const NODE_ARRAY: u8 = 0xC0;
pub(crate) const NODE_MAP: u8 = 0xC1;
pub(crate) const NODE_HASH_MAP32: u8 = 0x20;
pub(crate) const NODE_HASH_MAP64: u8 = 0x21;
pub(crate) const NODE_BOOL: u8 = 0xD0;
pub(crate) const NODE_INT: u8 = 0xD1;
pub(crate) const NODE_FLOAT: u8 = 0xD2;
pub(crate) const NODE_UINT: u8 = 0xD3;
pub(crate) const NODE_INT64: u8 = 0xD4;
pub(crate) const NODE_UINT64: u8 = 0xD5;
pub(crate) const NODE_DOUBLE: u8 = 0xD6;
pub(crate) const NODE_CHANGELOG: u8 = 0xE0;
pub(crate) const NODE_REMOVE: u8 = 0xE1;
pub(crate) const NODE_NULL: u8 = 0xFF;

// Array changelog key spec tags
pub(crate) const KEY_SPEC_POSITIONAL: u8 = 0;
pub(crate) const KEY_SPEC_HASH: u8 = 1;
pub(crate) const KEY_SPEC_NAMED: u8 = 2;

/// Nesting limit while reading, protects against corrupt recursive data
pub(crate) const MAX_DEPTH: usize = 512;

//! File formats understood by the engine
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

pub mod byml;
pub mod msbt;
pub mod pack;

// Re-export main document types
pub use byml::{Byml, parse_byml_bytes, read_byml, serialize_byml, write_byml};
pub use msbt::Msbt;
pub use pack::{REMOVED_ENTRY, Sarc, is_sarc};

//! Built mod changelogs
//!
//! Building a mod produces a [`Changelog`]: one entry per (canonical path,
//! file version) the mod touches, plus pass-through lists of auxiliary files.
//! Per-file content lives next to `changelog.tkcl` at [`content_path`].
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

mod wire;

use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::FileAttributes;
use crate::error::{Error, Result};

/// File name of the serialized changelog inside a built mod
pub const CHANGELOG_FILE: &str = "changelog.tkcl";

/// How an entry's content is applied during merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EntryType {
    /// Content is a changelog tree replayed onto vanilla
    Changelog = 0,
    /// Content replaces the file outright
    Copy = 1,
    /// No content; the file must be materialized from vanilla so nested
    /// entries have somewhere to land
    Placeholder = 2,
}

impl EntryType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Changelog),
            1 => Ok(Self::Copy),
            2 => Ok(Self::Placeholder),
            other => Err(Error::structure("changelog", format!("unknown entry type {other}"))),
        }
    }
}

/// One file touched by a mod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub canonical: String,
    pub kind: EntryType,
    pub attributes: FileAttributes,
    /// Zstd dictionary the vanilla file was compressed with (0 for none)
    pub zs_dictionary_id: u32,
    /// File-format versions this entry has content for
    pub versions: BTreeSet<i32>,
    /// Canonicals of the archives this file was extracted from
    pub parents: BTreeSet<String>,
}

impl ChangelogEntry {
    #[must_use]
    pub fn new(canonical: impl Into<String>, kind: EntryType, attributes: FileAttributes) -> Self {
        Self {
            canonical: canonical.into(),
            kind,
            attributes,
            zs_dictionary_id: 0,
            versions: BTreeSet::new(),
            parents: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: i32) -> Self {
        self.versions.insert(version);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.insert(parent.into());
        self
    }

    #[must_use]
    pub fn with_dictionary(mut self, id: u32) -> Self {
        self.zs_dictionary_id = id;
        self
    }

    /// Content version to use for `game_version`: the nearest one not above
    /// it, else the earliest
    #[must_use]
    pub fn select_version(&self, game_version: i32) -> i32 {
        self.versions
            .range(..=game_version)
            .next_back()
            .or_else(|| self.versions.iter().next())
            .copied()
            .unwrap_or(-1)
    }
}

/// A built mod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changelog {
    pub builder_version: u32,
    pub game_version: u32,
    entries: BTreeMap<String, ChangelogEntry>,
    /// Localization files (`romfs/Mals/*`)
    pub mals: Vec<String>,
    /// Executable patches (`.ips`, `.pchtxt`)
    pub patches: Vec<String>,
    pub cheats: Vec<String>,
    /// Loader binaries (`exefs/subsdk*`)
    pub loader: Vec<String>,
    /// Other `exefs` files
    pub exe: Vec<String>,
    pub reserved: Vec<String>,
}

impl Changelog {
    #[must_use]
    pub fn new(game_version: u32) -> Self {
        Self {
            builder_version: crate::BUILDER_VERSION,
            game_version,
            entries: BTreeMap::new(),
            mals: Vec::new(),
            patches: Vec::new(),
            cheats: Vec::new(),
            loader: Vec::new(),
            exe: Vec::new(),
            reserved: Vec::new(),
        }
    }

    /// Record an entry, merging it with an existing one for the same canonical
    ///
    /// Versions and parents accumulate; the type, attributes and dictionary of
    /// the later entry win.
    pub fn upsert(&mut self, entry: ChangelogEntry) {
        match self.entries.get_mut(&entry.canonical) {
            Some(existing) => {
                if existing.kind != entry.kind {
                    tracing::debug!(
                        "{}: entry type {:?} replaced by {:?}",
                        entry.canonical,
                        existing.kind,
                        entry.kind
                    );
                }
                existing.kind = entry.kind;
                existing.attributes = entry.attributes;
                existing.zs_dictionary_id = entry.zs_dictionary_id;
                existing.versions.extend(entry.versions);
                existing.parents.extend(entry.parents);
            }
            None => {
                self.entries.insert(entry.canonical.clone(), entry);
            }
        }
    }

    #[must_use]
    pub fn get(&self, canonical: &str) -> Option<&ChangelogEntry> {
        self.entries.get(canonical)
    }

    /// Entries in canonical order
    pub fn entries(&self) -> impl Iterator<Item = &ChangelogEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries and no auxiliary files
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.auxiliary_files().next().is_none()
    }

    /// Every pass-through file path
    pub fn auxiliary_files(&self) -> impl Iterator<Item = &str> {
        self.mals
            .iter()
            .chain(&self.patches)
            .chain(&self.cheats)
            .chain(&self.loader)
            .chain(&self.exe)
            .chain(&self.reserved)
            .map(String::as_str)
    }

    /// Serialize to the `TKCL` format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire::write(self)
    }

    /// Parse the `TKCL` format
    ///
    /// # Errors
    /// Returns an error on bad magic, an unsupported version or truncated data.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        wire::read(data)
    }
}

/// Location of an entry's content inside a built mod
#[must_use]
pub fn content_path(canonical: &str, version: i32) -> String {
    if version >= 0 {
        format!("romfs/{canonical}.{version}")
    } else {
        format!("romfs/{canonical}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_upsert_accumulates() {
        let mut changelog = Changelog::new(121);
        changelog.upsert(
            ChangelogEntry::new("RSDB/Tag.Product.rstbl.byml", EntryType::Changelog, FileAttributes::PRODUCT_FILE)
                .with_version(110),
        );
        changelog.upsert(
            ChangelogEntry::new("RSDB/Tag.Product.rstbl.byml", EntryType::Copy, FileAttributes::PRODUCT_FILE)
                .with_version(121),
        );

        let entry = changelog.get("RSDB/Tag.Product.rstbl.byml").unwrap();
        assert_eq!(changelog.len(), 1);
        assert_eq!(entry.kind, EntryType::Copy);
        assert_eq!(entry.versions.iter().copied().collect::<Vec<_>>(), vec![110, 121]);
    }

    #[test]
    fn test_select_version() {
        let entry = ChangelogEntry::new("a", EntryType::Changelog, FileAttributes::PRODUCT_FILE)
            .with_version(100)
            .with_version(120);
        assert_eq!(entry.select_version(121), 120);
        assert_eq!(entry.select_version(110), 100);
        assert_eq!(entry.select_version(90), 100);

        let unversioned = ChangelogEntry::new("b", EntryType::Copy, FileAttributes::empty());
        assert_eq!(unversioned.select_version(121), -1);
    }

    #[test]
    fn test_content_path() {
        assert_eq!(content_path("Actor/Foo.byml", -1), "romfs/Actor/Foo.byml");
        assert_eq!(
            content_path("RSDB/Tag.Product.rstbl.byml", 121),
            "romfs/RSDB/Tag.Product.rstbl.byml.121"
        );
    }
}

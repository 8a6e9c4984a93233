//! Keyed tables
//!
//! Large row tables (RSDB, the tag table, GameData) identify rows by a key
//! field rather than by position. A precompiled [`TableIndex`] maps each key
//! to the row position in the vanilla table of every game version, so diffing
//! and merging never scan the vanilla table for a row.
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

pub mod game_data;
pub mod index;
pub mod rsdb;
pub mod tag;

pub use game_data::{GAME_DATA_CANONICAL, GameDataIndex, diff_game_data, merge_game_data};
pub use index::{TableIndex, TableIndexBuilder};
pub use rsdb::{RsdbTableDef, default_tables, diff_rsdb, merge_rsdb};
pub use tag::{TAG_CANONICAL, TagTable, diff_tags, merge_tags};

use std::collections::HashMap;

use crate::diff::KeyValue;
use crate::error::Result;
use crate::formats::Byml;
use crate::utils::key_hash;

/// Hash of the key field `field` of `row`, or `None` when the field is missing
pub(crate) fn row_key_hash(row: &Byml, field: &str) -> Result<Option<u64>> {
    match row.get(field) {
        Some(value) => Ok(Some(key_hash(&KeyValue::from_named_node(field, value)?.hash_bytes()))),
        None => Ok(None),
    }
}

/// Finds vanilla rows by key hash
///
/// The precompiled index is authoritative for the tables it covers; a hit is
/// still verified against the row actually stored at that position. Tables it
/// does not cover fall back to a map built from the vanilla rows.
pub(crate) struct RowLocator<'a> {
    index: &'a TableIndex,
    table: u32,
    version: i32,
    local: HashMap<u64, usize>,
}

impl<'a> RowLocator<'a> {
    pub(crate) fn new(
        index: &'a TableIndex,
        table: u32,
        version: i32,
        vanilla_keys: impl IntoIterator<Item = Option<u64>>,
    ) -> Self {
        let local = if index.contains_table(table) {
            HashMap::new()
        } else {
            let mut local = HashMap::new();
            for (position, key) in vanilla_keys.into_iter().enumerate() {
                if let Some(key) = key {
                    local.entry(key).or_insert(position);
                }
            }
            local
        };
        Self {
            index,
            table,
            version,
            local,
        }
    }

    /// Position of `key`, checked with `verify`
    pub(crate) fn locate(&self, key: u64, verify: impl Fn(usize) -> bool) -> Option<usize> {
        if self.index.contains_table(self.table) {
            let position = self.index.lookup(self.table, key, self.version)?;
            if verify(position) {
                return Some(position);
            }
            tracing::trace!("Stale index entry {:016X} at {}", key, position);
            return None;
        }
        self.local.get(&key).copied()
    }

    /// Row bytes pinned to the requested version, if cached
    pub(crate) fn cached_row(&self, key: u64) -> Option<&'a [u8]> {
        self.index.cached_row(self.table, key, self.version)
    }
}

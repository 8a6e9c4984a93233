//! GameData list
//!
//! `GameData/GameDataList.Product.byml` holds named sub-tables under `Data`,
//! each an array of rows identified by an integer `Hash`. `Bool64bitKey` uses
//! 64-bit hashes, every other sub-table 32-bit ones, and each width has its
//! own index keyed by (sub-table name hash, row hash).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::diff::{ArrayRules, DiffOptions, MergeTracking, NodePath, diff, merge_into};
use crate::error::{Error, Result};
use crate::formats::Byml;
use crate::utils::name_hash;

use super::{RowLocator, TableIndex};

pub const GAME_DATA_CANONICAL: &str = "GameData/GameDataList.Product.byml";

const DATA: &str = "Data";
const HASH: &str = "Hash";
const WIDE_TABLE: &str = "Bool64bitKey";
const STRUCT_TABLE: &str = "Struct";

/// Row indices for both key widths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameDataIndex {
    pub narrow: TableIndex,
    pub wide: TableIndex,
}

impl GameDataIndex {
    #[must_use]
    pub fn new(narrow: TableIndex, wide: TableIndex) -> Self {
        Self { narrow, wide }
    }

    /// Load both widths from serialized index files
    pub fn load<P: AsRef<Path>>(narrow: P, wide: P) -> Result<Self> {
        Ok(Self {
            narrow: TableIndex::from_bytes(&fs::read(narrow)?)?,
            wide: TableIndex::from_bytes(&fs::read(wide)?)?,
        })
    }

    fn for_table(&self, table: &str) -> &TableIndex {
        if table == WIDE_TABLE {
            &self.wide
        } else {
            &self.narrow
        }
    }
}

fn sub_tables(root: &Byml) -> Result<&IndexMap<String, Byml>> {
    root.get(DATA)
        .and_then(Byml::as_map)
        .ok_or_else(|| Error::structure(GAME_DATA_CANONICAL, "missing Data"))
}

fn row_hash(row: &Byml) -> Option<u64> {
    match row.get(HASH)? {
        Byml::Int(v) => Some(u64::from(*v as u32)),
        Byml::Int64(v) => Some(*v as u64),
        other => other.as_u64(),
    }
}

fn rules_for<'a>(table: &str, rules: &'a ArrayRules, keyed: &'a ArrayRules) -> &'a ArrayRules {
    if table == STRUCT_TABLE { keyed } else { rules }
}

fn table_path(table: &str) -> NodePath {
    NodePath::root().with_key(DATA).with_key(table)
}

/// Diff the GameData list against vanilla
///
/// Only rows the vanilla index knows about are diffed; the rest are dropped.
///
/// # Errors
/// Returns an error if `Data` is missing or a row diff fails.
pub fn diff_game_data(
    source: &Byml,
    vanilla: &Byml,
    index: &GameDataIndex,
    version: i32,
    rules: &ArrayRules,
) -> Result<Option<Byml>> {
    let keyed = ArrayRules::keyed();
    let source_tables = sub_tables(source)?;
    let vanilla_tables = sub_tables(vanilla)?;
    let empty = Vec::new();

    let mut changelog = IndexMap::new();
    for (table, source_rows) in source_tables {
        let Some(source_rows) = source_rows.as_array() else {
            continue;
        };
        let vanilla_rows = vanilla_tables
            .get(table)
            .and_then(Byml::as_array)
            .unwrap_or(&empty);
        let vanilla_hashes: Vec<Option<u64>> = vanilla_rows.iter().map(row_hash).collect();
        let locator = RowLocator::new(
            index.for_table(table),
            name_hash(table),
            version,
            vanilla_hashes.iter().copied(),
        );
        let table_rules = rules_for(table, rules, &keyed);
        let path = table_path(table);

        let mut changes: BTreeMap<u64, Byml> = BTreeMap::new();
        let mut dropped = 0usize;
        for (i, row) in source_rows.iter().enumerate() {
            let Some(hash) = row_hash(row) else {
                dropped += 1;
                continue;
            };
            let Some(position) =
                locator.locate(hash, |p| vanilla_hashes.get(p) == Some(&Some(hash)))
            else {
                tracing::trace!("{}: row {:X} not in vanilla index, dropped", table, hash);
                dropped += 1;
                continue;
            };
            let row_path = path.with_index(i);
            if let Some(change) = diff(
                row,
                &vanilla_rows[position],
                table_rules,
                DiffOptions::default(),
                &row_path,
            )? {
                changes.insert(hash, change);
            }
        }
        if dropped > 0 {
            tracing::debug!("{}: dropped {} unindexed rows", table, dropped);
        }
        if changes.is_empty() {
            continue;
        }

        let node = if table == WIDE_TABLE {
            Byml::HashMap64(changes.into_iter().collect())
        } else {
            Byml::HashMap32(changes.into_iter().map(|(hash, change)| (hash as u32, change)).collect())
        };
        changelog.insert(table.clone(), node);
    }

    Ok((!changelog.is_empty()).then_some(Byml::Map(changelog)))
}

/// Merge GameData changelogs onto the vanilla list of the target version
pub fn merge_game_data(
    base: &mut Byml,
    changelogs: &[Byml],
    index: &GameDataIndex,
    version: i32,
    rules: &ArrayRules,
) -> Result<()> {
    let keyed = ArrayRules::keyed();
    let mut tracking: IndexMap<String, MergeTracking> = IndexMap::new();

    for changelog in changelogs {
        let Some(tables) = changelog.as_map() else {
            return Err(Error::structure(GAME_DATA_CANONICAL, "changelog is not a map"));
        };
        for (table, changes) in tables {
            let changes: Vec<(u64, &Byml)> = match changes {
                Byml::HashMap32(changes) => changes.iter().map(|(h, c)| (u64::from(*h), c)).collect(),
                Byml::HashMap64(changes) => changes.iter().map(|(h, c)| (*h, c)).collect(),
                _ => {
                    return Err(Error::structure(
                        GAME_DATA_CANONICAL,
                        format!("{table}: changelog is not a hash map"),
                    ));
                }
            };

            let Some(rows) = base
                .as_map_mut()
                .and_then(|root| root.get_mut(DATA))
                .and_then(Byml::as_map_mut)
                .and_then(|data| data.get_mut(table))
                .and_then(Byml::as_array_mut)
            else {
                tracing::trace!("{}: sub-table missing from base", table);
                continue;
            };
            let hashes: Vec<Option<u64>> = rows.iter().map(row_hash).collect();
            let locator =
                RowLocator::new(index.for_table(table), name_hash(table), version, hashes.iter().copied());
            let path = table_path(table);
            let table_tracking = tracking.entry(table.clone()).or_default();

            for (hash, change) in changes {
                match locator.locate(hash, |p| hashes.get(p) == Some(&Some(hash))) {
                    Some(p) => merge_into(&mut rows[p], change, &path.with_index(p), table_tracking)?,
                    None => tracing::trace!("{}: row {:X} not in base, skipped", table, hash),
                }
            }
        }
    }

    for (table, table_tracking) in tracking {
        table_tracking.apply(base, rules_for(&table, rules, &keyed))?;
    }
    Ok(())
}

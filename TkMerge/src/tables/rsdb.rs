//! RSDB row tables
//!
//! Each `RSDB/<Name>.Product.<version>.rstbl.byml` file is an array of row
//! maps identified by one key field. The changelog of a table is:
//!
//! ```text
//! { Add:    { key hash -> full row },
//!   Anchor: { added key hash -> key hash of the row it follows },
//!   Edit:   { key hash -> row changelog },
//!   Remove: [ key hash, ... ] }
//! ```
//!
//! Added rows without an anchor go first in the table.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::diff::{
    ArrayRules, DiffOptions, KeyValue, MergeTracking, NodePath, apply_changelog, diff, merge_into,
};
use crate::error::{Error, Result};
use crate::formats::Byml;
use crate::utils::{key_hash, name_hash};

use super::{RowLocator, TableIndex, row_key_hash};

const ADD: &str = "Add";
const ANCHOR: &str = "Anchor";
const EDIT: &str = "Edit";
const REMOVE: &str = "Remove";

/// Built-in tables and their key fields
const BUILTIN_TABLES: &[(&str, &str)] = &[
    ("ActorInfo", "RowId"),
    ("AttachmentActorInfo", "RowId"),
    ("Challenge", "RowId"),
    ("EnhancementMaterialInfo", "RowId"),
    ("EventPlayEnvSetting", "RowId"),
    ("EventSetting", "RowId"),
    ("GameActorInfo", "RowId"),
    ("GameAnalyzedEventInfo", "RowId"),
    ("GameEventBaseSetting", "RowId"),
    ("GameEventMetadata", "RowId"),
    ("LoadingTips", "RowId"),
    ("Location", "RowId"),
    ("LocatorData", "RowId"),
    ("PouchActorInfo", "RowId"),
    ("XLinkPropertyTable", "NameHash"),
    ("XLinkPropertyTableList", "Name"),
    ("RumbleCall", "Name"),
    ("UIScreen", "Name"),
    ("TagDef", "FullTagId"),
];

/// One keyed RSDB table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsdbTableDef {
    /// Table name (`ActorInfo`)
    pub name: String,
    /// Key field (`RowId`)
    pub key: String,
}

impl RsdbTableDef {
    #[must_use]
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
        }
    }

    /// Canonical path of the table file
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("RSDB/{}.Product.rstbl.byml", self.name)
    }

    /// Identity of the table in a [`TableIndex`]
    #[must_use]
    pub fn table_hash(&self) -> u32 {
        name_hash(&self.canonical())
    }
}

/// The built-in table set
#[must_use]
pub fn default_tables() -> Vec<RsdbTableDef> {
    BUILTIN_TABLES
        .iter()
        .map(|(name, key)| RsdbTableDef::new(name, key))
        .collect()
}

fn rows<'a>(table: &RsdbTableDef, node: &'a Byml) -> Result<&'a [Byml]> {
    node.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| Error::structure(table.canonical(), "root is not an array"))
}

fn key_hashes(table: &RsdbTableDef, rows: &[Byml]) -> Result<Vec<Option<u64>>> {
    rows.iter().map(|row| row_key_hash(row, &table.key)).collect()
}

/// Diff an RSDB table against vanilla
///
/// `version` is the file version the source was authored against. Rows
/// missing from the vanilla index are emitted as full adds; with
/// `track_removals`, vanilla rows absent from the source are recorded too.
///
/// # Errors
/// Returns an error if either root is not an array or a key field has an
/// unsupported type.
pub fn diff_rsdb(
    table: &RsdbTableDef,
    source: &Byml,
    vanilla: &Byml,
    index: &TableIndex,
    version: i32,
    rules: &ArrayRules,
    track_removals: bool,
) -> Result<Option<Byml>> {
    let source_rows = rows(table, source)?;
    let vanilla_rows = rows(table, vanilla)?;
    let vanilla_keys = key_hashes(table, vanilla_rows)?;
    let locator = RowLocator::new(
        index,
        table.table_hash(),
        version,
        vanilla_keys.iter().copied(),
    );

    let mut added = IndexMap::new();
    let mut anchors = IndexMap::new();
    let mut edited = IndexMap::new();
    let mut seen = HashSet::with_capacity(source_rows.len());
    // Key of the last source row that exists in vanilla
    let mut anchor: Option<u64> = None;

    for (i, row) in source_rows.iter().enumerate() {
        let hash = match row_key_hash(row, &table.key)? {
            Some(hash) => hash,
            None => {
                tracing::warn!(
                    "{}: row {} has no {} field, adding it as a new row",
                    table.name,
                    i,
                    table.key
                );
                let hash = key_hash(&row.to_bytes()?);
                added.insert(hash, row.clone());
                if let Some(anchor) = anchor {
                    anchors.insert(hash, Byml::UInt64(anchor));
                }
                continue;
            }
        };
        seen.insert(hash);

        let cached = locator.cached_row(hash).map(Byml::from_bytes).transpose()?;
        let vanilla_row = cached.as_ref().or_else(|| {
            locator
                .locate(hash, |p| vanilla_keys.get(p) == Some(&Some(hash)))
                .map(|p| &vanilla_rows[p])
        });

        match vanilla_row {
            Some(vanilla_row) => {
                let path = NodePath::root().with_index(i);
                if let Some(change) = diff(row, vanilla_row, rules, DiffOptions::default(), &path)? {
                    edited.insert(hash, change);
                }
                anchor = Some(hash);
            }
            None => {
                added.insert(hash, row.clone());
                if let Some(anchor) = anchor {
                    anchors.insert(hash, Byml::UInt64(anchor));
                }
            }
        }
    }

    let mut removed = Vec::new();
    if track_removals {
        for key in vanilla_keys.iter().flatten() {
            if !seen.contains(key) {
                removed.push(Byml::UInt64(*key));
            }
        }
    }

    let mut changelog = IndexMap::new();
    if !added.is_empty() {
        changelog.insert(ADD.to_string(), Byml::HashMap64(added));
    }
    if !anchors.is_empty() {
        changelog.insert(ANCHOR.to_string(), Byml::HashMap64(anchors));
    }
    if !edited.is_empty() {
        changelog.insert(EDIT.to_string(), Byml::HashMap64(edited));
    }
    if !removed.is_empty() {
        changelog.insert(REMOVE.to_string(), Byml::Array(removed));
    }
    tracing::debug!("{}: {} changed sections", table.name, changelog.len());
    Ok((!changelog.is_empty()).then_some(Byml::Map(changelog)))
}

/// Merge RSDB changelogs onto the vanilla table of the target game version
pub fn merge_rsdb(
    table: &RsdbTableDef,
    base: &mut Byml,
    changelogs: &[Byml],
    index: &TableIndex,
    version: i32,
    rules: &ArrayRules,
) -> Result<()> {
    let base_keys = key_hashes(table, rows(table, base)?)?;
    let locator = RowLocator::new(index, table.table_hash(), version, base_keys.iter().copied());
    let locate = |hash: u64| locator.locate(hash, |p| base_keys.get(p) == Some(&Some(hash)));

    let mut tracking = MergeTracking::new();
    let root = NodePath::root();
    // Pending new rows with their insertion point in base numbering
    let mut additions: IndexMap<u64, (Byml, usize)> = IndexMap::new();

    {
        let rows = base
            .as_array_mut()
            .ok_or_else(|| Error::structure(table.canonical(), "root is not an array"))?;

        for changelog in changelogs {
            if let Some(Byml::HashMap64(edits)) = changelog.get(EDIT) {
                for (hash, change) in edits {
                    if let Some(p) = locate(*hash) {
                        merge_into(&mut rows[p], change, &root.with_index(p), &mut tracking)?;
                    } else if let Some((row, _)) = additions.get_mut(hash) {
                        apply_changelog(row, change, rules)?;
                    } else {
                        tracing::trace!("{}: edited row {:016X} not in base", table.name, hash);
                    }
                }
            }

            if let Some(Byml::Array(removed)) = changelog.get(REMOVE) {
                for hash in removed.iter().filter_map(Byml::as_u64) {
                    match locate(hash) {
                        Some(p) => tracking.remove_keyed(&root, p),
                        None => {
                            additions.shift_remove(&hash);
                        }
                    }
                }
            }

            let anchors = match changelog.get(ANCHOR) {
                Some(Byml::HashMap64(anchors)) => Some(anchors),
                _ => None,
            };
            if let Some(Byml::HashMap64(added)) = changelog.get(ADD) {
                for (hash, row) in added {
                    if let Some(p) = locate(*hash) {
                        // Row exists in this version's vanilla table
                        merge_into(&mut rows[p], row, &root.with_index(p), &mut tracking)?;
                    } else if let Some((existing, _)) = additions.get_mut(hash) {
                        if let Some(change) = diff(row, existing, rules, DiffOptions::union(), &root)? {
                            apply_changelog(existing, &change, rules)?;
                        }
                    } else {
                        let position = match anchors.and_then(|a| a.get(hash)).and_then(Byml::as_u64) {
                            Some(anchor) => locate(anchor).map_or(base_keys.len(), |p| p + 1),
                            None => 0,
                        };
                        additions.insert(*hash, (row.clone(), position));
                    }
                }
            }
        }
    }

    for (hash, (row, position)) in additions {
        tracking.insert(&root, position, Some((KeyValue::U64(hash), None)), row);
    }
    tracking.apply(base, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TableIndexBuilder;
    use pretty_assertions::assert_eq;

    fn actor(id: &str, life: i32) -> Byml {
        Byml::map([("RowId", Byml::from(id)), ("Life", Byml::Int(life))])
    }

    fn table() -> RsdbTableDef {
        RsdbTableDef::new("ActorInfo", "RowId")
    }

    #[test]
    fn test_round_trip_without_index() {
        let vanilla = Byml::Array(vec![actor("A", 1), actor("B", 2), actor("C", 3)]);
        let source = Byml::Array(vec![actor("A", 10), actor("C", 3), actor("D", 4)]);
        let rules = ArrayRules::new();
        let index = TableIndex::new();

        let changelog = diff_rsdb(&table(), &source, &vanilla, &index, 121, &rules, true)
            .unwrap()
            .unwrap();
        assert_eq!(changelog.get(REMOVE).and_then(Byml::as_array).map(Vec::len), Some(1));

        let mut base = vanilla.clone();
        merge_rsdb(&table(), &mut base, &[changelog], &index, 121, &rules).unwrap();
        assert_eq!(base, source);
    }

    #[test]
    fn test_middle_insert_keeps_position() {
        let vanilla = Byml::Array(vec![actor("A", 1), actor("C", 3)]);
        let source = Byml::Array(vec![actor("A", 1), actor("B", 2), actor("C", 3)]);
        let rules = ArrayRules::new();
        let index = TableIndex::new();

        let changelog = diff_rsdb(&table(), &source, &vanilla, &index, 121, &rules, false)
            .unwrap()
            .unwrap();
        let mut base = vanilla.clone();
        merge_rsdb(&table(), &mut base, &[changelog], &index, 121, &rules).unwrap();
        assert_eq!(base, source);
    }

    #[test]
    fn test_leading_insert_without_anchor() {
        let vanilla = Byml::Array(vec![actor("B", 2)]);
        let source = Byml::Array(vec![actor("A", 1), actor("B", 2)]);
        let rules = ArrayRules::new();
        let index = TableIndex::new();

        let changelog = diff_rsdb(&table(), &source, &vanilla, &index, 121, &rules, false)
            .unwrap()
            .unwrap();
        assert!(changelog.get(ANCHOR).is_none());
        let mut base = vanilla.clone();
        merge_rsdb(&table(), &mut base, &[changelog], &index, 121, &rules).unwrap();
        assert_eq!(base, source);
    }

    #[test]
    fn test_removals_are_opt_in() {
        let vanilla = Byml::Array(vec![actor("A", 1), actor("B", 2)]);
        let source = Byml::Array(vec![actor("A", 1)]);
        let result = diff_rsdb(
            &table(),
            &source,
            &vanilla,
            &TableIndex::new(),
            121,
            &ArrayRules::new(),
            false,
        )
        .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_index_resolves_target_version() {
        // Version 100 has [A, B]; version 121 reordered to [B, A]
        let key = |id: &str| key_hash(&KeyValue::String(id.to_string()).hash_bytes());
        let mut builder = TableIndexBuilder::new();
        builder.add_table(table().table_hash(), 100, [key("A"), key("B")]);
        builder.add_table(table().table_hash(), 121, [key("B"), key("A")]);
        let index = builder.build();
        let rules = ArrayRules::new();

        let vanilla_100 = Byml::Array(vec![actor("A", 1), actor("B", 2)]);
        let source = Byml::Array(vec![actor("A", 1), actor("B", 20)]);
        let changelog = diff_rsdb(&table(), &source, &vanilla_100, &index, 100, &rules, false)
            .unwrap()
            .unwrap();

        let mut base = Byml::Array(vec![actor("B", 2), actor("A", 1)]);
        merge_rsdb(&table(), &mut base, &[changelog], &index, 121, &rules).unwrap();
        assert_eq!(base, Byml::Array(vec![actor("B", 20), actor("A", 1)]));
    }

    #[test]
    fn test_colliding_adds_union() {
        let vanilla = Byml::Array(vec![actor("A", 1)]);
        let rules = ArrayRules::new();
        let index = TableIndex::new();
        let new_a = Byml::map([("RowId", Byml::from("N")), ("Life", Byml::Int(5))]);
        let new_b = Byml::map([("RowId", Byml::from("N")), ("Speed", Byml::Float(2.0))]);

        let a = diff_rsdb(&table(), &Byml::Array(vec![actor("A", 1), new_a]), &vanilla, &index, 121, &rules, false)
            .unwrap()
            .unwrap();
        let b = diff_rsdb(&table(), &Byml::Array(vec![actor("A", 1), new_b]), &vanilla, &index, 121, &rules, false)
            .unwrap()
            .unwrap();

        let mut base = vanilla.clone();
        merge_rsdb(&table(), &mut base, &[a, b], &index, 121, &rules).unwrap();
        assert_eq!(
            base,
            Byml::Array(vec![
                actor("A", 1),
                Byml::map([
                    ("RowId", Byml::from("N")),
                    ("Life", Byml::Int(5)),
                    ("Speed", Byml::Float(2.0)),
                ]),
            ])
        );
    }
}

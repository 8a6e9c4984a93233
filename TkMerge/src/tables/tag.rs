//! Tag table
//!
//! `RSDB/Tag.Product.rstbl.byml` stores every actor's tag set as a bit
//! matrix: `PathList` holds (prefix, name, suffix) triplets, one per row,
//! `TagList` the sorted tag names, and `BitTable` one bit per (row, tag),
//! row-major and LSB-first. `RankTable` is carried through untouched.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::formats::Byml;
use crate::utils::{key_hash, name_hash};

use super::{RowLocator, TableIndex};

pub const TAG_CANONICAL: &str = "RSDB/Tag.Product.rstbl.byml";

const PATH_LIST: &str = "PathList";
const TAG_LIST: &str = "TagList";
const BIT_TABLE: &str = "BitTable";
const RANK_TABLE: &str = "RankTable";

/// One actor row of the tag table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub path: [String; 3],
    pub tags: BTreeSet<String>,
}

impl TagRow {
    /// Row identity: the three path parts concatenated
    #[must_use]
    pub fn key(&self) -> String {
        self.path.concat()
    }

    fn key_hash(&self) -> u64 {
        key_hash(self.key().as_bytes())
    }
}

/// Decoded tag table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagTable {
    pub rows: Vec<TagRow>,
    pub rank_table: Option<Byml>,
}

fn strings<'a>(root: &'a Byml, field: &str) -> Result<Vec<&'a str>> {
    root.get(field)
        .and_then(Byml::as_array)
        .ok_or_else(|| Error::structure(TAG_CANONICAL, format!("missing {field}")))?
        .iter()
        .map(|node| {
            node.as_str()
                .ok_or_else(|| Error::structure(TAG_CANONICAL, format!("non-string in {field}")))
        })
        .collect()
}

impl TagTable {
    /// Decode the bit matrix into per-row tag sets
    ///
    /// # Errors
    /// Returns an error if a list is missing, `PathList` is not a multiple of
    /// three, or `BitTable` is too short for the row and tag counts.
    pub fn from_byml(root: &Byml) -> Result<Self> {
        let paths = strings(root, PATH_LIST)?;
        let tags = strings(root, TAG_LIST)?;
        if paths.len() % 3 != 0 {
            return Err(Error::structure(TAG_CANONICAL, "PathList is not made of triplets"));
        }
        let row_count = paths.len() / 3;
        let bits = match root.get(BIT_TABLE) {
            Some(Byml::Binary(bits)) => bits.as_slice(),
            _ => return Err(Error::structure(TAG_CANONICAL, "missing BitTable")),
        };
        if bits.len() * 8 < row_count * tags.len() {
            return Err(Error::structure(
                TAG_CANONICAL,
                format!(
                    "BitTable holds {} bits, need {}",
                    bits.len() * 8,
                    row_count * tags.len()
                ),
            ));
        }

        let rows = paths
            .chunks_exact(3)
            .enumerate()
            .map(|(r, path)| {
                let row_tags = tags
                    .iter()
                    .enumerate()
                    .filter(|(t, _)| {
                        let bit = r * tags.len() + t;
                        bits[bit / 8] & (1 << (bit % 8)) != 0
                    })
                    .map(|(_, tag)| (*tag).to_string())
                    .collect();
                TagRow {
                    path: [path[0].to_string(), path[1].to_string(), path[2].to_string()],
                    tags: row_tags,
                }
            })
            .collect();

        Ok(Self {
            rows,
            rank_table: root.get(RANK_TABLE).cloned(),
        })
    }

    /// Sorted union of every row's tags
    #[must_use]
    pub fn tag_list(&self) -> Vec<&str> {
        let all: BTreeSet<&str> = self
            .rows
            .iter()
            .flat_map(|row| row.tags.iter().map(String::as_str))
            .collect();
        all.into_iter().collect()
    }

    /// Encode, rebuilding `TagList` and `BitTable` from the row sets
    #[must_use]
    pub fn to_byml(&self) -> Byml {
        self.to_byml_with(&[])
    }

    /// Like [`TagTable::to_byml`], keeping unused tags from `keep` in `TagList`
    #[must_use]
    pub fn to_byml_with(&self, keep: &[String]) -> Byml {
        let mut tags: BTreeSet<&str> = self.tag_list().into_iter().collect();
        tags.extend(keep.iter().map(String::as_str));
        let tag_positions: HashMap<&str, usize> =
            tags.iter().enumerate().map(|(i, tag)| (*tag, i)).collect();

        let mut bits = vec![0u8; (self.rows.len() * tags.len()).div_ceil(8)];
        for (r, row) in self.rows.iter().enumerate() {
            for tag in &row.tags {
                if let Some(t) = tag_positions.get(tag.as_str()) {
                    let bit = r * tags.len() + t;
                    bits[bit / 8] |= 1 << (bit % 8);
                }
            }
        }

        let mut root = IndexMap::new();
        root.insert(
            PATH_LIST.to_string(),
            Byml::Array(
                self.rows
                    .iter()
                    .flat_map(|row| row.path.iter().map(|part| Byml::String(part.clone())))
                    .collect(),
            ),
        );
        root.insert(
            TAG_LIST.to_string(),
            Byml::Array(tags.iter().map(|tag| Byml::from(*tag)).collect()),
        );
        root.insert(BIT_TABLE.to_string(), Byml::Binary(bits));
        if let Some(rank) = &self.rank_table {
            root.insert(RANK_TABLE.to_string(), rank.clone());
        }
        Byml::Map(root)
    }
}

/// Walk two sorted tag sets in lock-step
fn diff_sets<'a>(
    source: &'a BTreeSet<String>,
    vanilla: &'a BTreeSet<String>,
) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut src = source.iter().peekable();
    let mut van = vanilla.iter().peekable();
    loop {
        match (src.peek().copied(), van.peek().copied()) {
            (Some(s), Some(v)) => match s.cmp(v) {
                Ordering::Less => {
                    added.push(s.as_str());
                    src.next();
                }
                Ordering::Greater => {
                    removed.push(v.as_str());
                    van.next();
                }
                Ordering::Equal => {
                    src.next();
                    van.next();
                }
            },
            (Some(s), None) => {
                added.push(s.as_str());
                src.next();
            }
            (None, Some(v)) => {
                removed.push(v.as_str());
                van.next();
            }
            (None, None) => break,
        }
    }
    (added, removed)
}

fn string_array(values: &[&str]) -> Byml {
    Byml::Array(values.iter().map(|value| Byml::from(*value)).collect())
}

fn locator<'a>(index: &'a TableIndex, version: i32, table: &TagTable) -> RowLocator<'a> {
    RowLocator::new(
        index,
        name_hash(TAG_CANONICAL),
        version,
        table.rows.iter().map(|row| Some(row.key_hash())),
    )
}

/// Diff the tag table against vanilla
///
/// # Errors
/// Returns an error if either table cannot be decoded.
pub fn diff_tags(
    source: &Byml,
    vanilla: &Byml,
    index: &TableIndex,
    version: i32,
) -> Result<Option<Byml>> {
    let source = TagTable::from_byml(source)?;
    let vanilla = TagTable::from_byml(vanilla)?;
    let locator = locator(index, version, &vanilla);
    let empty = BTreeSet::new();

    let mut changelog = IndexMap::new();
    for row in &source.rows {
        let hash = row.key_hash();
        let vanilla_tags = locator
            .locate(hash, |p| vanilla.rows.get(p).is_some_and(|v| v.path == row.path))
            .map_or(&empty, |p| &vanilla.rows[p].tags);

        let (added, removed) = diff_sets(&row.tags, vanilla_tags);
        if added.is_empty() && removed.is_empty() {
            continue;
        }
        let path: Vec<&str> = row.path.iter().map(String::as_str).collect();
        let mut change = IndexMap::new();
        change.insert("Path".to_string(), string_array(&path));
        if !added.is_empty() {
            change.insert("Add".to_string(), string_array(&added));
        }
        if !removed.is_empty() {
            change.insert("Remove".to_string(), string_array(&removed));
        }
        changelog.insert(row.key(), Byml::Map(change));
    }

    tracing::debug!("Tag table: {} rows changed", changelog.len());
    Ok((!changelog.is_empty()).then_some(Byml::Map(changelog)))
}

fn tag_strings<'a>(change: &'a Byml, field: &'a str) -> impl Iterator<Item = String> + 'a {
    change
        .get(field)
        .and_then(Byml::as_array)
        .into_iter()
        .flatten()
        .filter_map(Byml::as_str)
        .map(str::to_string)
}

/// Merge tag changelogs onto the vanilla tag table
///
/// New rows are appended in the order they are first seen; `TagList` keeps
/// every vanilla tag even when no row uses it any more.
///
/// # Errors
/// Returns an error if the base cannot be decoded or a changelog row has a
/// malformed `Path`.
pub fn merge_tags(
    base: &Byml,
    changelogs: &[Byml],
    index: &TableIndex,
    version: i32,
) -> Result<Byml> {
    let vanilla_tags: Vec<String> = strings(base, TAG_LIST)?
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut table = TagTable::from_byml(base)?;
    let vanilla_rows = table.rows.len();
    let locator = locator(index, version, &table);
    let mut appended: HashMap<String, usize> = HashMap::new();

    for changelog in changelogs {
        let Some(rows) = changelog.as_map() else {
            return Err(Error::structure(TAG_CANONICAL, "changelog is not a map"));
        };
        for (key, change) in rows {
            let path = strings(change, "Path")?;
            let [prefix, name, suffix] = path.as_slice() else {
                return Err(Error::structure(TAG_CANONICAL, format!("bad Path for {key}")));
            };
            let path = [prefix.to_string(), name.to_string(), suffix.to_string()];

            let hash = key_hash(key.as_bytes());
            let position = locator
                .locate(hash, |p| p < vanilla_rows && table.rows[p].path == path)
                .or_else(|| appended.get(key).copied());
            let position = match position {
                Some(position) => position,
                None => {
                    table.rows.push(TagRow {
                        path,
                        tags: BTreeSet::new(),
                    });
                    appended.insert(key.clone(), table.rows.len() - 1);
                    table.rows.len() - 1
                }
            };

            let row = &mut table.rows[position];
            for tag in tag_strings(change, "Remove") {
                row.tags.remove(&tag);
            }
            row.tags.extend(tag_strings(change, "Add"));
        }
    }

    Ok(table.to_byml_with(&vanilla_tags))
}

//! Merge tracking
//!
//! Several changelogs are merged onto one base. Their array positions all
//! refer to the vanilla layout, so structural edits (removals, insertions)
//! cannot be applied as they are read: the first one would shift every
//! position the others rely on. Instead they are accumulated per array and
//! applied in one pass after every changelog has been read.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::Result;
use crate::formats::byml::Byml;

use super::array::ArrayRules;
use super::byml_diff::diff;
use super::merge::apply_changelog;
use super::types::{DiffOptions, KeyValue, NodePath, PathSegment};

type Key = (KeyValue, Option<KeyValue>);

/// One insertion waiting to be applied
#[derive(Debug, Clone)]
struct PendingInsert {
    key: Option<Key>,
    value: Byml,
}

/// Pending structural changes of one array
#[derive(Debug, Default)]
struct ArrayTracking {
    removals: BTreeSet<usize>,
    keyed_removals: BTreeSet<usize>,
    /// Insertions grouped by target position
    insertions: BTreeMap<usize, Vec<PendingInsert>>,
    /// First position each key was inserted at
    key_positions: HashMap<Key, usize>,
}

impl ArrayTracking {
    fn insert(&mut self, position: usize, key: Option<Key>, value: Byml) {
        let position = match &key {
            Some(key) => *self.key_positions.entry(key.clone()).or_insert(position),
            None => position,
        };
        self.insertions
            .entry(position)
            .or_default()
            .push(PendingInsert { key, value });
    }

    fn apply(self, array: &mut Vec<Byml>, rules: &ArrayRules, path: &NodePath) -> Result<()> {
        let removed: BTreeSet<usize> = self.removals.union(&self.keyed_removals).copied().collect();
        if !removed.is_empty() {
            let mut index = 0;
            array.retain(|_| {
                let keep = !removed.contains(&index);
                index += 1;
                keep
            });
        }

        // Positions are in base numbering: shift past removals, then past
        // every entry already inserted in front
        let mut offset = 0;
        for (position, group) in self.insertions {
            let entries = fold_group(group, rules, path)?;
            let shifted = position - removed.range(..position).count();
            let start = (shifted + offset).min(array.len());
            offset += entries.len();
            for (i, value) in entries.into_iter().enumerate() {
                array.insert(start + i, value);
            }
        }
        Ok(())
    }
}

/// Merge insertions that share a key into the first one
fn fold_group(group: Vec<PendingInsert>, rules: &ArrayRules, path: &NodePath) -> Result<Vec<Byml>> {
    let mut folded: Vec<PendingInsert> = Vec::with_capacity(group.len());
    for insert in group {
        let existing = insert
            .key
            .as_ref()
            .and_then(|key| folded.iter().position(|f| f.key.as_ref() == Some(key)));
        match existing {
            Some(idx) => {
                tracing::debug!("{}: folding colliding insertion", path);
                let acc = &mut folded[idx].value;
                if let Some(change) = diff(&insert.value, acc, rules, DiffOptions::union(), path)? {
                    apply_changelog(acc, &change, rules)?;
                }
            }
            None => folded.push(insert),
        }
    }
    Ok(folded.into_iter().map(|insert| insert.value).collect())
}

/// Accumulated structural changes for every array of one base tree
#[derive(Debug, Default)]
pub struct MergeTracking {
    arrays: BTreeMap<NodePath, ArrayTracking>,
}

impl MergeTracking {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Record a positional removal of `index` in the array at `path`
    pub fn remove(&mut self, path: &NodePath, index: usize) {
        self.arrays.entry(path.clone()).or_default().removals.insert(index);
    }

    /// Record a removal resolved from a key
    pub fn remove_keyed(&mut self, path: &NodePath, index: usize) {
        self.arrays
            .entry(path.clone())
            .or_default()
            .keyed_removals
            .insert(index);
    }

    /// Record an insertion before `position` of the array at `path`
    pub fn insert(&mut self, path: &NodePath, position: usize, key: Option<Key>, value: Byml) {
        self.arrays
            .entry(path.clone())
            .or_default()
            .insert(position, key, value);
    }

    /// Apply everything to `root`, deepest arrays first
    ///
    /// Nested arrays are addressed by their pre-mutation indices, so they must
    /// be finished before any enclosing array shifts.
    pub fn apply(self, root: &mut Byml, rules: &ArrayRules) -> Result<()> {
        let mut arrays: Vec<(NodePath, ArrayTracking)> = self.arrays.into_iter().collect();
        arrays.sort_by(|(a, _), (b, _)| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));

        for (path, tracking) in arrays {
            match resolve_mut(root, &path) {
                Some(Byml::Array(array)) => tracking.apply(array, rules, &path)?,
                _ => tracing::trace!("{}: tracked array no longer exists", path),
            }
        }
        Ok(())
    }
}

fn resolve_mut<'a>(root: &'a mut Byml, path: &NodePath) -> Option<&'a mut Byml> {
    let mut node = root;
    for segment in &path.segments {
        node = match (node, segment) {
            (Byml::Map(map), PathSegment::Key(key)) => map.get_mut(key)?,
            (Byml::HashMap32(map), PathSegment::Hash32(hash)) => map.get_mut(hash)?,
            (Byml::HashMap64(map), PathSegment::Hash64(hash)) => map.get_mut(hash)?,
            (Byml::Array(array), PathSegment::Index(index)) => array.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{diff_byml, merge_changelogs};
    use pretty_assertions::assert_eq;

    fn row(hash: u32) -> Byml {
        Byml::map([("Hash", Byml::UInt(hash))])
    }

    fn ints(values: &[i32]) -> Byml {
        Byml::Array(values.iter().map(|v| Byml::Int(*v)).collect())
    }

    #[test]
    fn test_removals_then_insertions() {
        let mut root = Byml::map([("List", ints(&[1, 2, 3, 4]))]);
        let path = NodePath::root().with_key("List");

        let mut tracking = MergeTracking::new();
        tracking.remove(&path, 1);
        tracking.insert(&path, 0, None, Byml::Int(9));
        tracking.insert(&path, 0, None, Byml::Int(8));
        tracking.insert(&path, 2, None, Byml::Int(7));
        tracking.apply(&mut root, &ArrayRules::new()).unwrap();

        // [1,3,4] -> 9,8 before 1 -> 7 before 3
        assert_eq!(root.get("List"), Some(&ints(&[9, 8, 1, 7, 3, 4])));
    }

    #[test]
    fn test_insertions_from_two_changelogs() {
        let rules = ArrayRules::new();
        let vanilla = Byml::map([("Rows", Byml::Array(vec![row(1), row(2), row(3)]))]);
        let middle = Byml::map([("Rows", Byml::Array(vec![row(1), row(10), row(2), row(3)]))]);
        let tail = Byml::map([("Rows", Byml::Array(vec![row(1), row(2), row(3), row(20)]))]);

        let mut base = vanilla.clone();
        let changelogs = [
            diff_byml(&middle, &vanilla, &rules).unwrap().unwrap(),
            diff_byml(&tail, &vanilla, &rules).unwrap().unwrap(),
        ];
        merge_changelogs(&mut base, &changelogs, &rules).unwrap();
        assert_eq!(
            base.get("Rows"),
            Some(&Byml::Array(vec![row(1), row(10), row(2), row(3), row(20)]))
        );
    }

    #[test]
    fn test_insertion_after_other_removal() {
        let rules = ArrayRules::new();
        let vanilla = Byml::map([("Rows", Byml::Array(vec![row(1), row(2), row(3)]))]);
        let removed = Byml::map([("Rows", Byml::Array(vec![row(2), row(3)]))]);
        let inserted = Byml::map([("Rows", Byml::Array(vec![row(1), row(2), row(30), row(3)]))]);

        let mut base = vanilla.clone();
        let changelogs = [
            diff_byml(&removed, &vanilla, &rules).unwrap().unwrap(),
            diff_byml(&inserted, &vanilla, &rules).unwrap().unwrap(),
        ];
        merge_changelogs(&mut base, &changelogs, &rules).unwrap();
        assert_eq!(base.get("Rows"), Some(&Byml::Array(vec![row(2), row(30), row(3)])));
    }

    #[test]
    fn test_insert_past_end_clamps() {
        let mut root = ints(&[1]);
        let mut tracking = MergeTracking::new();
        tracking.insert(&NodePath::root(), 5, None, Byml::Int(2));
        tracking.apply(&mut root, &ArrayRules::new()).unwrap();
        assert_eq!(root, ints(&[1, 2]));
    }

    #[test]
    fn test_colliding_keys_fold() {
        let mut root = Byml::Array(vec![]);
        let key = (KeyValue::U32(5), None);
        let mut tracking = MergeTracking::new();
        tracking.insert(
            &NodePath::root(),
            0,
            Some(key.clone()),
            Byml::map([("Hash", Byml::UInt(5)), ("A", Byml::Int(1))]),
        );
        tracking.insert(
            &NodePath::root(),
            3,
            Some(key.clone()),
            Byml::map([("Hash", Byml::UInt(5)), ("B", Byml::Int(2))]),
        );
        tracking.apply(&mut root, &ArrayRules::new()).unwrap();

        assert_eq!(
            root,
            Byml::Array(vec![Byml::map([
                ("Hash", Byml::UInt(5)),
                ("A", Byml::Int(1)),
                ("B", Byml::Int(2)),
            ])])
        );
    }

    #[test]
    fn test_nested_applied_before_parent() {
        let mut root = Byml::Array(vec![ints(&[1, 2]), ints(&[3])]);
        let mut tracking = MergeTracking::new();
        tracking.remove(&NodePath::root(), 0);
        tracking.insert(&NodePath::root().with_index(1), 1, None, Byml::Int(4));
        tracking.apply(&mut root, &ArrayRules::new()).unwrap();
        assert_eq!(root, Byml::Array(vec![ints(&[3, 4])]));
    }
}

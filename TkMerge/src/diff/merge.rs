//! Changelog merging onto a base tree

use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::Result;
use crate::formats::byml::Byml;

use super::array::ArrayRules;
use super::tracking::MergeTracking;
use super::types::{ArrayChangelog, ChangeKind, KeyValue, NodePath, PathSegment};

/// Apply one changelog to `base`
///
/// # Errors
/// Returns an error if an array key cannot be read from the base.
pub fn apply_changelog(base: &mut Byml, changelog: &Byml, rules: &ArrayRules) -> Result<()> {
    merge_changelogs(base, std::iter::once(changelog), rules)
}

/// Merge several changelogs onto `base`, in order
///
/// Later changelogs win conflicting scalar edits. Array insertions and
/// removals from every changelog are batched and applied once at the end.
pub fn merge_changelogs<'a>(
    base: &mut Byml,
    changelogs: impl IntoIterator<Item = &'a Byml>,
    rules: &ArrayRules,
) -> Result<()> {
    let mut tracking = MergeTracking::new();
    let root = NodePath::root();
    for changelog in changelogs {
        merge_into(base, changelog, &root, &mut tracking)?;
    }
    tracking.apply(base, rules)
}

/// Merge one changelog node into `base`, recording array structure changes in `tracking`
pub fn merge_into(
    base: &mut Byml,
    changelog: &Byml,
    path: &NodePath,
    tracking: &mut MergeTracking,
) -> Result<()> {
    match (base, changelog) {
        (_, Byml::Remove) => {
            tracing::trace!("{}: removal marker without a parent map", path);
        }
        (Byml::Map(base), Byml::Map(changes)) => {
            merge_entries(base, changes, path, tracking, |k| PathSegment::Key(k.clone()))?;
        }
        (Byml::HashMap32(base), Byml::HashMap32(changes)) => {
            merge_entries(base, changes, path, tracking, |k| PathSegment::Hash32(*k))?;
        }
        (Byml::HashMap64(base), Byml::HashMap64(changes)) => {
            merge_entries(base, changes, path, tracking, |k| PathSegment::Hash64(*k))?;
        }
        (Byml::Array(array), Byml::Changelog(changes)) => {
            merge_array(array, changes, path, tracking)?;
        }
        (base, Byml::Changelog(_)) => {
            tracing::warn!(
                "{}: array changelog cannot apply to {}",
                path,
                base.type_name()
            );
        }
        (base, literal) => *base = literal.clone(),
    }
    Ok(())
}

fn merge_entries<K: Hash + Eq + Clone>(
    base: &mut IndexMap<K, Byml>,
    changes: &IndexMap<K, Byml>,
    path: &NodePath,
    tracking: &mut MergeTracking,
    segment: impl Fn(&K) -> PathSegment,
) -> Result<()> {
    for (key, change) in changes {
        if matches!(change, Byml::Remove) {
            base.shift_remove(key);
            continue;
        }
        match base.get_mut(key) {
            Some(existing) => {
                merge_into(existing, change, &path.with_segment(segment(key)), tracking)?;
            }
            None if has_markers(change) => {
                tracing::trace!("{}: changes target a key missing from the base", path);
            }
            None => {
                base.insert(key.clone(), change.clone());
            }
        }
    }
    Ok(())
}

type Key = (KeyValue, Option<KeyValue>);

fn merge_array(
    array: &mut [Byml],
    changelog: &ArrayChangelog,
    path: &NodePath,
    tracking: &mut MergeTracking,
) -> Result<()> {
    let mut key_index: HashMap<Key, usize> = HashMap::new();
    if changelog.key.is_keyed() {
        for (i, node) in array.iter().enumerate() {
            if let Some(key) = changelog.key.key_of(node)? {
                key_index.entry(key).or_insert(i);
            }
        }
    }

    for change in &changelog.changes {
        let key = change.key();
        match change.kind {
            ChangeKind::Edit => {
                let target = match &key {
                    Some(key) => key_index.get(key).copied(),
                    None => Some(change.position),
                };
                match target.filter(|&i| i < array.len()) {
                    Some(i) => merge_into(&mut array[i], &change.value, &path.with_index(i), tracking)?,
                    None => tracing::trace!("{}: edit target {} not in base", path, change),
                }
            }
            ChangeKind::Remove => match &key {
                Some(key) => match key_index.get(key) {
                    Some(&i) => tracking.remove_keyed(path, i),
                    None => tracing::trace!("{}: removed key {} not in base", path, key.0),
                },
                None if change.position < array.len() => tracking.remove(path, change.position),
                None => tracing::trace!("{}: removal {} out of range", path, change),
            },
            ChangeKind::Add => match key.as_ref().and_then(|key| key_index.get(key)) {
                // The row already exists (added by the base itself): overlay it
                Some(&i) => merge_into(&mut array[i], &change.value, &path.with_index(i), tracking)?,
                None => tracking.insert(path, change.position, key, change.value.clone()),
            },
        }
    }
    Ok(())
}

/// Whether a node carries diff markers anywhere below it
fn has_markers(node: &Byml) -> bool {
    match node {
        Byml::Changelog(_) | Byml::Remove => true,
        Byml::Array(items) => items.iter().any(has_markers),
        Byml::Map(map) => map.values().any(has_markers),
        Byml::HashMap32(map) => map.values().any(has_markers),
        Byml::HashMap64(map) => map.values().any(has_markers),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffOptions, diff, diff_byml};
    use pretty_assertions::assert_eq;

    fn row(hash: u32, fields: &[(&str, i32)]) -> Byml {
        let mut map = IndexMap::new();
        map.insert("Hash".to_string(), Byml::UInt(hash));
        for (name, value) in fields {
            map.insert((*name).to_string(), Byml::Int(*value));
        }
        Byml::Map(map)
    }

    fn round_trip(source: &Byml, vanilla: &Byml) {
        let rules = ArrayRules::new();
        let mut base = vanilla.clone();
        if let Some(changelog) = diff_byml(source, vanilla, &rules).unwrap() {
            apply_changelog(&mut base, &changelog, &rules).unwrap();
        }
        assert_eq!(&base, source);
    }

    #[test]
    fn test_round_trip_maps_and_arrays() {
        let vanilla = Byml::map([
            ("Life", Byml::Int(10)),
            ("Gone", Byml::Bool(true)),
            ("Rows", Byml::Array(vec![row(1, &[("A", 1)]), row(2, &[("A", 2)])])),
            ("Positional", Byml::Array(vec![Byml::map([("X", Byml::Int(1))])])),
        ]);
        let source = Byml::map([
            ("Life", Byml::Int(99)),
            ("New", Byml::from("value")),
            (
                "Rows",
                Byml::Array(vec![row(3, &[("A", 3)]), row(1, &[("A", 5)])]),
            ),
            (
                "Positional",
                Byml::Array(vec![
                    Byml::map([("X", Byml::Int(2))]),
                    Byml::map([("X", Byml::Int(3))]),
                ]),
            ),
        ]);
        round_trip(&source, &vanilla);
    }

    #[test]
    fn test_later_changelog_wins_scalar() {
        let rules = ArrayRules::new();
        let vanilla = Byml::map([("Life", Byml::Int(10))]);
        let a = diff_byml(&Byml::map([("Life", Byml::Int(20))]), &vanilla, &rules).unwrap().unwrap();
        let b = diff_byml(&Byml::map([("Life", Byml::Int(30))]), &vanilla, &rules).unwrap().unwrap();

        let mut base = vanilla.clone();
        merge_changelogs(&mut base, [&a, &b], &rules).unwrap();
        assert_eq!(base.get("Life"), Some(&Byml::Int(30)));
    }

    #[test]
    fn test_keyed_additions_from_two_mods() {
        let rules = ArrayRules::new();
        let vanilla = Byml::map([("Rows", Byml::Array(vec![row(1, &[])]))]);
        let mod_a = Byml::map([("Rows", Byml::Array(vec![row(1, &[]), row(2, &[])]))]);
        let mod_b = Byml::map([("Rows", Byml::Array(vec![row(1, &[]), row(3, &[])]))]);

        let a = diff_byml(&mod_a, &vanilla, &rules).unwrap().unwrap();
        let b = diff_byml(&mod_b, &vanilla, &rules).unwrap().unwrap();
        let mut base = vanilla.clone();
        merge_changelogs(&mut base, [&a, &b], &rules).unwrap();

        assert_eq!(
            base.get("Rows"),
            Some(&Byml::Array(vec![row(1, &[]), row(2, &[]), row(3, &[])]))
        );
    }

    #[test]
    fn test_keyed_field_edits_both_survive() {
        let rules = ArrayRules::new();
        let vanilla = Byml::map([("Rows", Byml::Array(vec![row(1, &[("X", 0), ("Y", 0)])]))]);
        let mod_a = Byml::map([("Rows", Byml::Array(vec![row(1, &[("X", 1), ("Y", 0)])]))]);
        let mod_b = Byml::map([("Rows", Byml::Array(vec![row(1, &[("X", 0), ("Y", 2)])]))]);

        let a = diff_byml(&mod_a, &vanilla, &rules).unwrap().unwrap();
        let b = diff_byml(&mod_b, &vanilla, &rules).unwrap().unwrap();
        let mut base = vanilla.clone();
        merge_changelogs(&mut base, [&a, &b], &rules).unwrap();

        assert_eq!(
            base.get("Rows"),
            Some(&Byml::Array(vec![row(1, &[("X", 1), ("Y", 2)])]))
        );
    }

    #[test]
    fn test_union_fold_of_same_key() {
        let rules = ArrayRules::new();
        let vanilla = Byml::map([("Rows", Byml::Array(vec![row(1, &[])]))]);
        let mod_a = Byml::map([("Rows", Byml::Array(vec![row(1, &[]), row(9, &[("A", 1)])]))]);
        let mod_b = Byml::map([("Rows", Byml::Array(vec![row(9, &[("B", 2)]), row(1, &[])]))]);

        let a = diff_byml(&mod_a, &vanilla, &rules).unwrap().unwrap();
        let b = diff_byml(&mod_b, &vanilla, &rules).unwrap().unwrap();
        let mut base = vanilla.clone();
        merge_changelogs(&mut base, [&a, &b], &rules).unwrap();

        assert_eq!(
            base.get("Rows"),
            Some(&Byml::Array(vec![row(1, &[]), row(9, &[("A", 1), ("B", 2)])]))
        );
    }

    #[test]
    fn test_removed_key_not_resurrected_by_partial() {
        let rules = ArrayRules::new();
        let mut base = Byml::map([("Other", Byml::Int(1))]);
        let partial = Byml::map([(
            "Gone",
            Byml::map([("List", diff(
                &Byml::Array(vec![Byml::Int(1), Byml::Int(2)]),
                &Byml::Array(vec![Byml::Int(1)]),
                &rules,
                DiffOptions::default(),
                &NodePath::root(),
            ).unwrap().unwrap())]),
        )]);
        apply_changelog(&mut base, &partial, &rules).unwrap();
        assert_eq!(base, Byml::map([("Other", Byml::Int(1))]));
    }
}

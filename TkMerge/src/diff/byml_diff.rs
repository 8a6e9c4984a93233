//! Structural BYML diffing

use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::Result;
use crate::formats::byml::Byml;

use super::array::{ArrayRules, diff_array};
use super::types::{DiffOptions, NodePath, PathSegment};

/// Diff two trees with default options, starting at the root
///
/// # Errors
/// Returns an error if an array uses an unsupported key type.
pub fn diff_byml(source: &Byml, vanilla: &Byml, rules: &ArrayRules) -> Result<Option<Byml>> {
    diff(source, vanilla, rules, DiffOptions::default(), &NodePath::root())
}

/// Diff `source` against `vanilla`
///
/// The result is a changelog tree: maps carry only changed keys (with
/// [`Byml::Remove`] for removed ones), arrays become [`Byml::Changelog`]
/// nodes, and anything else is the replacement literal. Returns `Ok(None)`
/// when nothing changed.
pub fn diff(
    source: &Byml,
    vanilla: &Byml,
    rules: &ArrayRules,
    options: DiffOptions,
    path: &NodePath,
) -> Result<Option<Byml>> {
    match (source, vanilla) {
        (Byml::Map(src), Byml::Map(van)) => Ok(diff_entries(src, van, rules, options, path, |k| {
            PathSegment::Key(k.clone())
        })?
        .map(Byml::Map)),
        (Byml::HashMap32(src), Byml::HashMap32(van)) => Ok(diff_entries(
            src,
            van,
            rules,
            options,
            path,
            |k| PathSegment::Hash32(*k),
        )?
        .map(Byml::HashMap32)),
        (Byml::HashMap64(src), Byml::HashMap64(van)) => Ok(diff_entries(
            src,
            van,
            rules,
            options,
            path,
            |k| PathSegment::Hash64(*k),
        )?
        .map(Byml::HashMap64)),
        (Byml::Array(src), Byml::Array(van)) => Ok(diff_array(src, van, rules, options, path)?
            .map(|changelog| Byml::Changelog(Box::new(changelog)))),
        _ if source == vanilla => Ok(None),
        _ => Ok(Some(source.clone())),
    }
}

fn diff_entries<K: Hash + Eq + Clone>(
    source: &IndexMap<K, Byml>,
    vanilla: &IndexMap<K, Byml>,
    rules: &ArrayRules,
    options: DiffOptions,
    path: &NodePath,
    segment: impl Fn(&K) -> PathSegment,
) -> Result<Option<IndexMap<K, Byml>>> {
    let mut changes = IndexMap::new();

    for (key, src) in source {
        match vanilla.get(key) {
            Some(van) => {
                let child_path = path.with_segment(segment(key));
                if let Some(change) = diff(src, van, rules, options, &child_path)? {
                    changes.insert(key.clone(), change);
                }
            }
            None => {
                changes.insert(key.clone(), src.clone());
            }
        }
    }

    if options.emit_removals {
        for key in vanilla.keys() {
            if !source.contains_key(key) {
                changes.insert(key.clone(), Byml::Remove);
            }
        }
    }

    Ok((!changes.is_empty()).then_some(changes))
}

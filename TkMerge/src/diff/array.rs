//! Array diff strategies
//!
//! Four interchangeable ways of pairing the elements of a modified array with
//! its vanilla counterpart. Every strategy is deterministic: the first
//! available match wins and matched slots are never reordered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::formats::byml::Byml;

use super::byml_diff::diff;
use super::types::{ArrayChange, ArrayChangelog, ArrayKeySpec, DiffOptions, KeyValue, NodePath};

/// Field auto-detected as a row hash
const HASH_FIELD: &str = "Hash";

/// How one array is diffed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ArrayStrategy {
    /// Pair elements by position
    DirectIndex,
    /// Pair value-equal elements regardless of position
    Equality,
    /// Pair elements by an integer hash field
    HashKey { field: String },
    /// Pair elements by one or two named fields
    NamedKey {
        primary: String,
        #[serde(default)]
        secondary: Option<String>,
    },
}

impl ArrayStrategy {
    #[must_use]
    pub fn key_spec(&self) -> ArrayKeySpec {
        match self {
            Self::DirectIndex | Self::Equality => ArrayKeySpec::Positional,
            Self::HashKey { field } => ArrayKeySpec::Hash {
                field: field.clone(),
            },
            Self::NamedKey { primary, secondary } => ArrayKeySpec::Named {
                primary: primary.clone(),
                secondary: secondary.clone(),
            },
        }
    }
}

/// Strategy override for arrays stored under a given map key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayRule {
    /// Parent map key the array is stored under
    pub key: String,
    #[serde(flatten)]
    pub strategy: ArrayStrategy,
}

/// Ordered strategy rules; the first rule matching the parent key wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrayRules {
    rules: Vec<ArrayRule>,
}

impl ArrayRules {
    /// No overrides: every array uses auto-detection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The generic keyed rule set used for struct-like tables
    #[must_use]
    pub fn keyed() -> Self {
        Self::new()
            .with_rule(
                "DefaultValue",
                ArrayStrategy::HashKey {
                    field: HASH_FIELD.to_string(),
                },
            )
            .with_rule(
                "Children",
                ArrayStrategy::HashKey {
                    field: HASH_FIELD.to_string(),
                },
            )
    }

    /// Append a rule (lower precedence than the existing ones)
    #[must_use]
    pub fn with_rule(mut self, key: impl Into<String>, strategy: ArrayStrategy) -> Self {
        self.rules.push(ArrayRule {
            key: key.into(),
            strategy,
        });
        self
    }

    /// Append every rule of `other` after the existing ones
    pub fn extend(&mut self, other: &ArrayRules) {
        self.rules.extend(other.rules.iter().cloned());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Pick the strategy for the array at `path`
    #[must_use]
    pub fn select(&self, path: &NodePath, source: &[Byml], vanilla: &[Byml]) -> ArrayStrategy {
        if let Some(key) = path.last_key() {
            if let Some(rule) = self.rules.iter().find(|rule| rule.key == key) {
                return rule.strategy.clone();
            }
        }
        detect_strategy(source, vanilla)
    }
}

/// Auto-detection used when no rule matches
fn detect_strategy(source: &[Byml], vanilla: &[Byml]) -> ArrayStrategy {
    let mut all = source.iter().chain(vanilla);
    if source.is_empty() && vanilla.is_empty() {
        return ArrayStrategy::DirectIndex;
    }
    let hashed = all.clone().all(|node| {
        matches!(
            node.get(HASH_FIELD),
            Some(Byml::Int(_) | Byml::UInt(_) | Byml::Int64(_) | Byml::UInt64(_))
        )
    });
    if hashed {
        return ArrayStrategy::HashKey {
            field: HASH_FIELD.to_string(),
        };
    }
    if all.all(|node| !node.is_container()) {
        return ArrayStrategy::Equality;
    }
    ArrayStrategy::DirectIndex
}

/// Diff one array against its vanilla counterpart
///
/// Returns `Ok(None)` when the arrays are equivalent under the selected strategy.
///
/// # Errors
/// Returns [`crate::Error::UnsupportedKeyType`] when a hash key field holds
/// something other than an integer.
pub fn diff_array(
    source: &[Byml],
    vanilla: &[Byml],
    rules: &ArrayRules,
    options: DiffOptions,
    path: &NodePath,
) -> Result<Option<ArrayChangelog>> {
    let strategy = rules.select(path, source, vanilla);
    let changelog = match &strategy {
        ArrayStrategy::DirectIndex => diff_direct(source, vanilla, rules, options, path)?,
        ArrayStrategy::Equality => diff_equality(source, vanilla, rules, options, path)?,
        ArrayStrategy::HashKey { .. } | ArrayStrategy::NamedKey { .. } => {
            diff_keyed(strategy.key_spec(), source, vanilla, rules, options, path)?
        }
    };
    Ok((!changelog.is_empty()).then_some(changelog))
}

fn diff_direct(
    source: &[Byml],
    vanilla: &[Byml],
    rules: &ArrayRules,
    options: DiffOptions,
    path: &NodePath,
) -> Result<ArrayChangelog> {
    let mut changelog = ArrayChangelog::new(ArrayKeySpec::Positional);

    for (i, (src, van)) in source.iter().zip(vanilla).enumerate() {
        if let Some(change) = diff(src, van, rules, options, &path.with_index(i))? {
            changelog.push(ArrayChange::edit(i, change));
        }
    }
    for src in source.iter().skip(vanilla.len()) {
        changelog.push(ArrayChange::add(vanilla.len(), src.clone()));
    }
    if options.emit_removals {
        for i in source.len()..vanilla.len() {
            changelog.push(ArrayChange::remove(i));
        }
    }

    Ok(changelog)
}

/// Vanilla index each unmatched source element is inserted before
///
/// That is the vanilla index of the next matched source element, or the
/// vanilla length when no matched element follows.
fn insertion_points(matches: &[Option<usize>], vanilla_len: usize) -> Vec<usize> {
    let mut points = vec![vanilla_len; matches.len()];
    let mut next = vanilla_len;
    for (i, matched) in matches.iter().enumerate().rev() {
        points[i] = next;
        if let Some(j) = matched {
            next = *j;
        }
    }
    points
}

fn diff_equality(
    source: &[Byml],
    vanilla: &[Byml],
    rules: &ArrayRules,
    options: DiffOptions,
    path: &NodePath,
) -> Result<ArrayChangelog> {
    let mut changelog = ArrayChangelog::new(ArrayKeySpec::Positional);
    let mut vanilla_matched = vec![false; vanilla.len()];
    let mut matches: Vec<Option<usize>> = vec![None; source.len()];
    let mut edits = vec![false; source.len()];

    for (i, src) in source.iter().enumerate() {
        let found = vanilla
            .iter()
            .enumerate()
            .find(|(j, van)| !vanilla_matched[*j] && *van == src)
            .map(|(j, _)| j);
        if let Some(j) = found {
            vanilla_matched[j] = true;
            matches[i] = Some(j);
        }
    }
    for i in 0..source.len() {
        if matches[i].is_none() && i < vanilla.len() && !vanilla_matched[i] {
            vanilla_matched[i] = true;
            matches[i] = Some(i);
            edits[i] = true;
        }
    }

    let points = insertion_points(&matches, vanilla.len());
    for (i, src) in source.iter().enumerate() {
        if edits[i] {
            if let Some(change) = diff(src, &vanilla[i], rules, options, &path.with_index(i))? {
                changelog.push(ArrayChange::edit(i, change));
            }
        } else if matches[i].is_none() {
            changelog.push(ArrayChange::add(points[i], src.clone()));
        }
    }

    if options.emit_removals {
        for (j, matched) in vanilla_matched.iter().enumerate() {
            if !matched {
                changelog.push(ArrayChange::remove(j));
            }
        }
    }

    Ok(changelog)
}

type Key = (KeyValue, Option<KeyValue>);

fn diff_keyed(
    spec: ArrayKeySpec,
    source: &[Byml],
    vanilla: &[Byml],
    rules: &ArrayRules,
    options: DiffOptions,
    path: &NodePath,
) -> Result<ArrayChangelog> {
    let mut vanilla_index: HashMap<Key, usize> = HashMap::with_capacity(vanilla.len());
    for (j, van) in vanilla.iter().enumerate() {
        match spec.key_of(van)? {
            Some(key) => {
                vanilla_index.entry(key).or_insert(j);
            }
            None => tracing::trace!("{}[{}]: vanilla element has no key", path, j),
        }
    }

    let keys = source
        .iter()
        .map(|src| spec.key_of(src))
        .collect::<Result<Vec<_>>>()?;
    let mut vanilla_seen = vec![false; vanilla.len()];
    let mut matches: Vec<Option<usize>> = vec![None; source.len()];
    for (i, key) in keys.iter().enumerate() {
        if let Some(&j) = key.as_ref().and_then(|key| vanilla_index.get(key)) {
            if !vanilla_seen[j] {
                vanilla_seen[j] = true;
                matches[i] = Some(j);
            }
        }
    }

    let points = insertion_points(&matches, vanilla.len());
    let mut changelog = ArrayChangelog::new(spec.clone());
    for (i, (src, key)) in source.iter().zip(keys).enumerate() {
        match (key, matches[i]) {
            (None, _) => {
                tracing::warn!(
                    "{}[{}]: element is missing its key field, adding it by position",
                    path,
                    i
                );
                changelog.push(ArrayChange::add(points[i], src.clone()));
            }
            (Some(key), Some(j)) => {
                if let Some(change) = diff(src, &vanilla[j], rules, options, &path.with_index(j))? {
                    changelog.push(ArrayChange::edit(j, change).keyed(key));
                }
            }
            (Some(key), None) => changelog.push(ArrayChange::add(points[i], src.clone()).keyed(key)),
        }
    }

    if options.emit_removals {
        for (key, &j) in &vanilla_index {
            if !vanilla_seen[j] {
                changelog.push(ArrayChange::remove(j).keyed(key.clone()));
            }
        }
        // Hash map iteration order is arbitrary
        changelog.changes.sort_by_key(|change| (change.kind as u8, change.position));
    }

    Ok(changelog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeKind;
    use pretty_assertions::assert_eq;

    fn row(hash: u32, value: i32) -> Byml {
        Byml::map([("Hash", Byml::UInt(hash)), ("Value", Byml::Int(value))])
    }

    fn run(source: &[Byml], vanilla: &[Byml], rules: &ArrayRules) -> ArrayChangelog {
        diff_array(
            source,
            vanilla,
            rules,
            DiffOptions::default(),
            &NodePath::root().with_key("List"),
        )
        .unwrap()
        .unwrap_or_else(|| ArrayChangelog::new(ArrayKeySpec::Positional))
    }

    fn kinds(changelog: &ArrayChangelog) -> Vec<(ChangeKind, usize)> {
        changelog
            .changes
            .iter()
            .map(|change| (change.kind, change.position))
            .collect()
    }

    #[test]
    fn test_direct_index() {
        let rules = ArrayRules::new().with_rule("List", ArrayStrategy::DirectIndex);
        let vanilla = [Byml::Int(1), Byml::Int(2), Byml::Int(3)];

        let longer = run(&[Byml::Int(1), Byml::Int(5), Byml::Int(3), Byml::Int(4)], &vanilla, &rules);
        assert_eq!(kinds(&longer), vec![(ChangeKind::Edit, 1), (ChangeKind::Add, 3)]);

        let shorter = run(&[Byml::Int(1)], &vanilla, &rules);
        assert_eq!(kinds(&shorter), vec![(ChangeKind::Remove, 1), (ChangeKind::Remove, 2)]);
    }

    #[test]
    fn test_equality_reorder_is_empty() {
        let vanilla = [Byml::from("a"), Byml::from("b"), Byml::from("c")];
        let source = [Byml::from("c"), Byml::from("a"), Byml::from("b")];
        let result = diff_array(
            &source,
            &vanilla,
            &ArrayRules::new(),
            DiffOptions::default(),
            &NodePath::root(),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_equality_edit_and_remove() {
        let vanilla = [Byml::from("a"), Byml::from("b"), Byml::from("c")];
        let source = [Byml::from("a"), Byml::from("x")];
        let changelog = run(&source, &vanilla, &ArrayRules::new());
        assert_eq!(kinds(&changelog), vec![(ChangeKind::Edit, 1), (ChangeKind::Remove, 2)]);
        assert_eq!(changelog.changes[0].value, Byml::from("x"));
    }

    #[test]
    fn test_hash_keyed_detected() {
        let vanilla = [row(1, 10), row(2, 20), row(3, 30)];
        let source = [row(1, 10), row(4, 40), row(3, 31)];
        let changelog = run(&source, &vanilla, &ArrayRules::new());

        assert_eq!(
            changelog.key,
            ArrayKeySpec::Hash {
                field: "Hash".into()
            }
        );
        assert_eq!(
            kinds(&changelog),
            vec![(ChangeKind::Add, 2), (ChangeKind::Edit, 2), (ChangeKind::Remove, 1)]
        );
        let edit = &changelog.changes[1];
        assert_eq!(edit.primary_key, Some(KeyValue::U32(3)));
        assert_eq!(edit.value, Byml::map([("Value", Byml::Int(31))]));
    }

    #[test]
    fn test_named_key_missing_field_falls_back_to_add() {
        let rules = ArrayRules::new().with_rule(
            "List",
            ArrayStrategy::NamedKey {
                primary: "Name".into(),
                secondary: None,
            },
        );
        let vanilla = [Byml::map([("Name", Byml::from("A"))])];
        let source = [
            Byml::map([("Name", Byml::from("A"))]),
            Byml::map([("Other", Byml::Int(1))]),
        ];
        let changelog = run(&source, &vanilla, &rules);
        assert_eq!(kinds(&changelog), vec![(ChangeKind::Add, 1)]);
        assert!(changelog.changes[0].primary_key.is_none());
        assert!(changelog.validate().is_ok());
    }

    #[test]
    fn test_unsupported_hash_key() {
        let rules = ArrayRules::new().with_rule(
            "List",
            ArrayStrategy::HashKey {
                field: "Hash".into(),
            },
        );
        let bad = [Byml::map([("Hash", Byml::Float(1.0))])];
        let result = diff_array(
            &bad,
            &bad,
            &rules,
            DiffOptions::default(),
            &NodePath::root().with_key("List"),
        );
        assert!(matches!(result, Err(crate::Error::UnsupportedKeyType { .. })));
    }

    #[test]
    fn test_rules_deserialize() {
        let rules: ArrayRules = serde_json::from_str(
            r#"[{"key": "Tags", "strategy": "equality"},
                {"key": "Rows", "strategy": "named_key", "primary": "Name", "secondary": "Index"}]"#,
        )
        .unwrap();
        let path = NodePath::root().with_key("Rows");
        assert_eq!(
            rules.select(&path, &[], &[]),
            ArrayStrategy::NamedKey {
                primary: "Name".into(),
                secondary: Some("Index".into())
            }
        );
    }
}

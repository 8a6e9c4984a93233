//! Message table handler
//!
//! The changelog of a message table is a tree map keyed by label. Edited
//! labels map to their new text and deleted labels to a removal marker. New
//! labels map to `{Text, After}`, where `After` names the label they follow.

use indexmap::IndexMap;

use crate::canonical::TkPath;
use crate::error::{Error, Result};
use crate::formats::{Byml, Msbt};

use super::{BuildContext, BuildOutcome, FormatHandler, MergeContext};

const TEXT: &str = "Text";
const AFTER: &str = "After";

/// Insert `label` right after `after`, or first when there is no anchor
fn insert_after(table: &mut Msbt, label: &str, text: &str, after: Option<&str>) {
    let index = match after {
        Some(after) => table
            .entries
            .get_index_of(after)
            .map_or(table.entries.len(), |i| i + 1),
        None => 0,
    };
    table.entries.shift_insert(index, label.to_string(), text.to_string());
}

/// Diffs `.msbt` files label by label
#[derive(Debug, Clone, Copy, Default)]
pub struct MsbtHandler;

impl FormatHandler for MsbtHandler {
    fn name(&self) -> &'static str {
        "msbt"
    }

    fn build(
        &self,
        _ctx: &BuildContext<'_>,
        _path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome> {
        let Some(vanilla) = vanilla else {
            return Ok(BuildOutcome::Empty);
        };
        let source = Msbt::from_bytes(source)?;
        let vanilla = Msbt::from_bytes(vanilla)?;

        let mut changes = IndexMap::new();
        let mut previous: Option<&String> = None;
        for (label, text) in &source.entries {
            match vanilla.get(label) {
                Some(old) if old == text => {}
                Some(_) => {
                    changes.insert(label.clone(), Byml::String(text.clone()));
                }
                None => {
                    let mut added = IndexMap::new();
                    added.insert(TEXT.to_string(), Byml::String(text.clone()));
                    if let Some(previous) = previous {
                        added.insert(AFTER.to_string(), Byml::String(previous.clone()));
                    }
                    changes.insert(label.clone(), Byml::Map(added));
                }
            }
            previous = Some(label);
        }
        for label in vanilla.entries.keys() {
            if !source.entries.contains_key(label) {
                changes.insert(label.clone(), Byml::Remove);
            }
        }

        if changes.is_empty() {
            return Ok(BuildOutcome::Empty);
        }
        Ok(BuildOutcome::Changelog(Byml::Map(changes).to_bytes()?))
    }

    fn merge(
        &self,
        _ctx: &MergeContext<'_>,
        path: &TkPath,
        base: Vec<u8>,
        changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let mut table = Msbt::from_bytes(&base)?;
        for changelog in changelogs {
            let changelog = Byml::from_bytes(changelog)?;
            let changes = changelog
                .as_map()
                .ok_or_else(|| Error::structure(path.canonical.clone(), "changelog is not a map"))?;
            for (label, change) in changes {
                match change {
                    Byml::Remove => {
                        table.entries.shift_remove(label);
                    }
                    Byml::String(text) => table.insert(label.clone(), text.clone()),
                    Byml::Map(added) => {
                        let Some(Byml::String(text)) = added.get(TEXT) else {
                            return Err(Error::structure(
                                path.canonical.clone(),
                                format!("{label}: new label has no text"),
                            ));
                        };
                        if let Some(existing) = table.entries.get_mut(label) {
                            existing.clone_from(text);
                        } else {
                            let after = match added.get(AFTER) {
                                Some(Byml::String(after)) => Some(after.as_str()),
                                _ => None,
                            };
                            insert_after(&mut table, label, text, after);
                        }
                    }
                    other => {
                        return Err(Error::structure(
                            path.canonical.clone(),
                            format!("{label}: expected text, found {}", other.type_name()),
                        ));
                    }
                }
            }
        }
        table.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ModRoot;
    use crate::changelog::ChangelogEntry;
    use crate::config::TkConfig;
    use crate::handlers::{EntrySink, HandlerRegistry};
    use crate::rom::MemoryRom;
    use crate::utils::BufferPool;
    use pretty_assertions::assert_eq;

    struct NullSink;

    impl EntrySink for NullSink {
        fn record(&self, _entry: ChangelogEntry, _content: Option<&[u8]>) -> Result<()> {
            Ok(())
        }
    }

    fn table(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut table = Msbt::new();
        for (label, text) in entries {
            table.insert(*label, *text);
        }
        table.to_bytes().unwrap()
    }

    fn path() -> TkPath {
        TkPath::new("Mals/USen/EventFlowMsg/Intro.msbt", ModRoot::Romfs)
    }

    fn build(source: &[u8], vanilla: &[u8]) -> BuildOutcome {
        let rom = MemoryRom::new(121);
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        let pool = BufferPool::new(1);
        let ctx = BuildContext::new(&rom, &registry, &pool, &NullSink);
        MsbtHandler.build(&ctx, &path(), source, Some(vanilla)).unwrap()
    }

    fn merge(base: &[u8], changelogs: &[Vec<u8>]) -> Result<Vec<u8>> {
        let rom = MemoryRom::new(121);
        MsbtHandler.merge(&MergeContext::new(&rom), &path(), base.to_vec(), changelogs)
    }

    fn changelog(outcome: BuildOutcome) -> Vec<u8> {
        match outcome {
            BuildOutcome::Changelog(data) => data,
            other => panic!("expected a changelog, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_keeps_label_order() {
        let vanilla = table(&[("Intro", "Hello"), ("Outro", "Bye")]);
        let source = table(&[("Intro", "Hi"), ("Middle", "Wait"), ("Outro", "Bye")]);

        let changelog = changelog(build(&source, &vanilla));
        let merged = merge(&vanilla, &[changelog]).unwrap();
        assert_eq!(merged, source);
    }

    #[test]
    fn test_new_first_label() {
        let vanilla = table(&[("Intro", "Hello")]);
        let source = table(&[("Title", "Tears"), ("Intro", "Hello")]);

        let changelog = changelog(build(&source, &vanilla));
        assert_eq!(merge(&vanilla, &[changelog]).unwrap(), source);
    }

    #[test]
    fn test_identical_is_empty() {
        let vanilla = table(&[("Intro", "Hello"), ("Outro", "Bye")]);
        assert_eq!(build(&vanilla, &vanilla), BuildOutcome::Empty);
    }

    #[test]
    fn test_removed_label() {
        let vanilla = table(&[("Intro", "Hello"), ("Outro", "Bye")]);
        let source = table(&[("Outro", "Bye")]);

        let changelog = changelog(build(&source, &vanilla));
        assert_eq!(merge(&vanilla, &[changelog]).unwrap(), source);
    }

    #[test]
    fn test_two_changelogs_insert_in_place() {
        let vanilla = table(&[("A", "a"), ("C", "c")]);
        let first = changelog(build(&table(&[("A", "a"), ("B", "b"), ("C", "c")]), &vanilla));
        let second = changelog(build(&table(&[("A", "a"), ("C", "c"), ("D", "d")]), &vanilla));

        let merged = merge(&vanilla, &[first, second]).unwrap();
        assert_eq!(merged, table(&[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")]));
    }

    #[test]
    fn test_rejects_non_text_change() {
        let vanilla = table(&[("Intro", "Hello")]);
        let changelog = Byml::map([("Intro", Byml::Int(1))]).to_bytes().unwrap();
        assert!(merge(&vanilla, &[changelog]).is_err());
    }
}

//! Two-phase archive output
//!
//! Merge targets run concurrently and only *collect* into archives: each
//! archive is registered with its base bytes, and merged nested files are
//! appended as named entries. After every target has finished,
//! [`PackCollector::flush`] writes each archive exactly once, deepest first,
//! so nested archives land in their parents before the parents are written.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;

use crate::canonical::{FileAttributes, physical_name};
use crate::error::Result;
use crate::formats::{REMOVED_ENTRY, Sarc};
use crate::rom::TkRom;

use super::ModWriter;

/// Nesting depth beyond which parent chains are treated as cycles
const MAX_NESTING: usize = 32;

/// Archive waiting to be written
#[derive(Debug, Default)]
struct PendingArchive {
    /// Decompressed base archive; `None` until registered
    base: Option<Vec<u8>>,
    attributes: FileAttributes,
    dictionary: u32,
    parents: BTreeSet<String>,
    /// Name of this archive inside its parents
    entry_name: String,
    entries: BTreeMap<String, Vec<u8>>,
}

/// Written archive, reported back for size bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedArchive {
    pub canonical: String,
    /// Decompressed size
    pub size: usize,
    /// Whether it was written to romfs rather than into a parent
    pub top_level: bool,
}

/// Collects archive bases and merged entries across merge targets
#[derive(Debug, Default)]
pub struct PackCollector {
    archives: Mutex<HashMap<String, PendingArchive>>,
}

impl PackCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive and its (decompressed) base content
    pub fn register(
        &self,
        canonical: &str,
        base: Vec<u8>,
        attributes: FileAttributes,
        dictionary: u32,
        parents: BTreeSet<String>,
        entry_name: String,
    ) {
        let mut archives = self.archives.lock();
        let archive = archives.entry(canonical.to_string()).or_default();
        archive.base = Some(base);
        archive.attributes = attributes;
        archive.dictionary = dictionary;
        archive.parents = parents;
        archive.entry_name = entry_name;
    }

    /// Queue an entry for `archive`, replacing any queued entry of that name
    pub fn add_entry(&self, archive: &str, name: String, data: Vec<u8>) {
        self.archives
            .lock()
            .entry(archive.to_string())
            .or_default()
            .entries
            .insert(name, data);
    }

    /// Archives that received entries but were never registered
    #[must_use]
    pub fn unregistered(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .archives
            .lock()
            .iter()
            .filter(|(_, archive)| archive.base.is_none())
            .map(|(canonical, _)| canonical.clone())
            .collect();
        missing.sort();
        missing
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archives.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archives.lock().is_empty()
    }

    /// Write every archive once, deepest first
    ///
    /// Removed-entry markers delete their entry; everything else is inserted
    /// or overwritten. Top-level archives go to `writer` at their physical
    /// romfs path, nested ones into each parent.
    pub fn flush(self, rom: &dyn TkRom, writer: &dyn ModWriter) -> Result<Vec<FlushedArchive>> {
        let mut archives = self.archives.into_inner();
        let mut order: Vec<(usize, String)> = archives
            .keys()
            .map(|canonical| (depth(&archives, canonical), canonical.clone()))
            .collect();
        order.sort_by(|(a_depth, a), (b_depth, b)| b_depth.cmp(a_depth).then_with(|| a.cmp(b)));

        let mut flushed = Vec::with_capacity(order.len());
        for (_, canonical) in order {
            let Some(archive) = archives.remove(&canonical) else {
                continue;
            };
            let mut pack = match archive.base.as_deref() {
                Some(base) if !base.is_empty() => Sarc::from_bytes(base)?,
                _ => Sarc::new(),
            };
            for (name, data) in archive.entries {
                if data == REMOVED_ENTRY {
                    pack.remove(&name);
                } else {
                    pack.insert(name, data);
                }
            }
            let bytes = pack.to_bytes()?;
            let size = bytes.len();
            let compressed = if archive.attributes.contains(FileAttributes::ZS_COMPRESSED) {
                rom.zstd().compress(&bytes, archive.dictionary)?
            } else {
                bytes
            };

            let top_level = archive.parents.is_empty();
            if top_level {
                let path = format!("romfs/{}", rom.physical_path(&canonical, archive.attributes));
                tracing::debug!("Writing archive {} ({} entries)", path, pack.len());
                writer.write(&path, &compressed)?;
            } else {
                let name = if archive.entry_name.is_empty() {
                    physical_name(&canonical, archive.attributes, -1)
                } else {
                    archive.entry_name.clone()
                };
                for parent in &archive.parents {
                    match archives.get_mut(parent) {
                        Some(parent) => {
                            parent.entries.insert(name.clone(), compressed.clone());
                        }
                        None => tracing::warn!("{}: parent archive {} not collected", canonical, parent),
                    }
                }
            }
            flushed.push(FlushedArchive {
                canonical,
                size,
                top_level,
            });
        }
        Ok(flushed)
    }
}

/// Length of the longest parent chain above `canonical`
fn depth(archives: &HashMap<String, PendingArchive>, canonical: &str) -> usize {
    fn walk(
        archives: &HashMap<String, PendingArchive>,
        canonical: &str,
        visited: &mut HashSet<String>,
    ) -> usize {
        if visited.len() >= MAX_NESTING || !visited.insert(canonical.to_string()) {
            tracing::warn!("{}: archive nesting cycle", canonical);
            return 0;
        }
        let depth = archives
            .get(canonical)
            .map(|archive| {
                archive
                    .parents
                    .iter()
                    .map(|parent| 1 + walk(archives, parent, visited))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        visited.remove(canonical);
        depth
    }
    walk(archives, canonical, &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MemoryWriter;
    use crate::rom::MemoryRom;
    use pretty_assertions::assert_eq;

    fn pack(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut pack = Sarc::new();
        for (name, data) in entries {
            pack.insert(*name, data.to_vec());
        }
        pack.to_bytes().unwrap()
    }

    #[test]
    fn test_nested_archives_flush_into_parents() {
        let rom = MemoryRom::new(121);
        let writer = MemoryWriter::new();
        let collector = PackCollector::new();

        collector.register(
            "Pack/Outer.pack",
            pack(&[("Inner.pack", &pack(&[])), ("Keep.txt", b"keep"), ("Gone.txt", b"gone")]),
            FileAttributes::empty(),
            0,
            BTreeSet::new(),
            String::new(),
        );
        collector.register(
            "Inner.pack",
            pack(&[("A.txt", b"old")]),
            FileAttributes::empty(),
            0,
            BTreeSet::from(["Pack/Outer.pack".to_string()]),
            "Inner.pack".to_string(),
        );
        collector.add_entry("Inner.pack", "A.txt".to_string(), b"new".to_vec());
        collector.add_entry("Pack/Outer.pack", "Gone.txt".to_string(), REMOVED_ENTRY.to_vec());

        let flushed = collector.flush(&rom, &writer).unwrap();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].canonical, "Inner.pack");
        assert_eq!(writer.paths(), vec!["romfs/Pack/Outer.pack".to_string()]);

        let outer = Sarc::from_bytes(&writer.get("romfs/Pack/Outer.pack").unwrap()).unwrap();
        assert!(!outer.contains("Gone.txt"));
        assert_eq!(outer.get("Keep.txt"), Some(&b"keep"[..]));
        let inner = Sarc::from_bytes(outer.get("Inner.pack").unwrap()).unwrap();
        assert_eq!(inner.get("A.txt"), Some(&b"new"[..]));
    }

    #[test]
    fn test_unregistered_archives_are_reported() {
        let collector = PackCollector::new();
        collector.add_entry("Pack/Lost.pack", "A.txt".to_string(), Vec::new());
        assert_eq!(collector.unregistered(), vec!["Pack/Lost.pack".to_string()]);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let collector = PackCollector::new();
        for (name, parent) in [("A.pack", "B.pack"), ("B.pack", "A.pack")] {
            collector.register(
                name,
                Vec::new(),
                FileAttributes::empty(),
                0,
                BTreeSet::from([parent.to_string()]),
                name.to_string(),
            );
        }
        let flushed = collector
            .flush(&MemoryRom::new(121), &MemoryWriter::new())
            .unwrap();
        assert_eq!(flushed.len(), 2);
    }
}

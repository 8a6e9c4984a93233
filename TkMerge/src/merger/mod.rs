//! Merging built mods
//!
//! The [`Merger`] replays the changelogs of several built mods onto vanilla.
//! Entries are grouped by canonical path into targets, which are merged in
//! parallel; archives are collected and written once at the end, followed by
//! the resource size table.
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

pub mod collector;
pub mod rstb;

pub use collector::{FlushedArchive, PackCollector};
pub use rstb::{RSTB_CANONICAL, ResourceSizeTable};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::builder::{ModSource, ModWriter};
use crate::canonical::{FileAttributes, ModRoot, TkPath, physical_name};
use crate::changelog::{CHANGELOG_FILE, Changelog, ChangelogEntry, EntryType, content_path};
use crate::error::{Error, Result};
use crate::formats::{REMOVED_ENTRY, Sarc};
use crate::handlers::{HandlerRegistry, MergeContext};
use crate::rom::TkRom;
use crate::utils::{CancellationToken, Phase, Progress, ProgressCallback};

/// Parent chains longer than this are treated as cycles
const MAX_NESTING: usize = 32;

/// Summary of one merge
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Canonical targets merged
    pub targets: usize,
    /// Archives written or collected into parents
    pub archives: usize,
    /// Targets that failed, with their error
    pub failures: Vec<(String, Error)>,
}

impl MergeReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One mod's entry for a target
struct Contribution<'a> {
    source: &'a dyn ModSource,
    entry: &'a ChangelogEntry,
}

/// Everything shared by the targets of one merge
struct MergeSession<'a> {
    parents: HashMap<&'a str, BTreeSet<String>>,
    attributes: HashMap<&'a str, FileAttributes>,
    vanilla_cache: Mutex<HashMap<String, Option<Arc<Vec<u8>>>>>,
    collector: PackCollector,
    sizes: Mutex<Vec<(String, usize)>>,
    writer: &'a dyn ModWriter,
}

/// Merges built mods onto one vanilla dump
pub struct Merger<'a> {
    rom: &'a dyn TkRom,
    registry: &'a HandlerRegistry,
    cancel: CancellationToken,
}

impl<'a> Merger<'a> {
    #[must_use]
    pub fn new(rom: &'a dyn TkRom, registry: &'a HandlerRegistry) -> Self {
        Self {
            rom,
            registry,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Merge `mods`, given highest priority first
    ///
    /// # Errors
    /// Returns an error when a changelog cannot be read, output cannot be
    /// written, or the merge was cancelled. Other per-target failures are
    /// collected in the report.
    pub fn merge(&self, mods: &[&dyn ModSource], writer: &dyn ModWriter) -> Result<MergeReport> {
        self.merge_with_progress(mods, writer, &|_| {})
    }

    /// [`Merger::merge`] with progress updates
    pub fn merge_with_progress(
        &self,
        mods: &[&dyn ModSource],
        writer: &dyn ModWriter,
        progress: ProgressCallback<'_>,
    ) -> Result<MergeReport> {
        progress(&Progress::new(Phase::Scanning, 0, mods.len()));

        // Lowest priority first from here on
        let mut changelogs = Vec::with_capacity(mods.len());
        for source in mods.iter().rev() {
            let changelog = Changelog::from_bytes(&source.read(CHANGELOG_FILE)?)?;
            if changelog.game_version as i32 != self.rom.game_version() {
                tracing::debug!(
                    "Mod built for game version {}, merging for {}",
                    changelog.game_version,
                    self.rom.game_version()
                );
            }
            changelogs.push((*source, changelog));
        }

        let mut targets: BTreeMap<&str, Vec<Contribution<'_>>> = BTreeMap::new();
        let mut parents: HashMap<&str, BTreeSet<String>> = HashMap::new();
        let mut attributes: HashMap<&str, FileAttributes> = HashMap::new();
        for (source, changelog) in &changelogs {
            for entry in changelog.entries() {
                targets
                    .entry(entry.canonical.as_str())
                    .or_default()
                    .push(Contribution { source: *source, entry });
                parents
                    .entry(entry.canonical.as_str())
                    .or_default()
                    .extend(entry.parents.iter().cloned());
                attributes.insert(entry.canonical.as_str(), entry.attributes);
            }
        }

        let session = MergeSession {
            parents,
            attributes,
            vanilla_cache: Mutex::new(HashMap::new()),
            collector: PackCollector::new(),
            sizes: Mutex::new(Vec::new()),
            writer,
        };

        let total = targets.len();
        tracing::info!("Merging {} targets from {} mods", total, mods.len());
        let merged = AtomicUsize::new(0);
        let results: Vec<(&str, Result<()>)> = targets
            .par_iter()
            .map(|(canonical, contributions)| {
                let current = merged.fetch_add(1, Ordering::SeqCst) + 1;
                progress(&Progress::with_file(Phase::Merging, current, total, *canonical));
                let result = self
                    .cancel
                    .check()
                    .and_then(|()| self.merge_target(&session, canonical, contributions));
                (*canonical, result)
            })
            .collect();

        let mut report = MergeReport {
            targets: total,
            ..MergeReport::default()
        };
        for (canonical, result) in results {
            match result {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::error!("Failed to merge {}: {}", canonical, err);
                    report.failures.push((canonical.to_string(), err));
                }
            }
        }

        self.cancel.check()?;
        progress(&Progress::new(Phase::Writing, 0, session.collector.len()));
        for canonical in session.collector.unregistered() {
            let attributes = session.attributes(&canonical);
            let base = self.resolve_vanilla(&session, &canonical, 0)?;
            session.collector.register(
                &canonical,
                base.map(|base| base.to_vec()).unwrap_or_default(),
                attributes,
                0,
                session.parents_of(&canonical),
                physical_name(&canonical, attributes, -1),
            );
        }

        let MergeSession {
            collector, sizes, ..
        } = session;
        let flushed = collector.flush(self.rom, writer)?;
        report.archives = flushed.len();

        let mut sizes = sizes.into_inner();
        sizes.extend(
            flushed
                .into_iter()
                .filter(|archive| archive.top_level)
                .map(|archive| (archive.canonical, archive.size)),
        );
        self.write_size_table(writer, &sizes)?;

        for (source, changelog) in &changelogs {
            for file in changelog
                .patches
                .iter()
                .chain(&changelog.cheats)
                .chain(&changelog.loader)
                .chain(&changelog.exe)
            {
                writer.write(file, &source.read(file)?)?;
            }
        }

        progress(&Progress::new(Phase::Complete, total, total));
        tracing::info!(
            "Merged {} targets, {} archives, {} failed",
            report.targets,
            report.archives,
            report.failures.len()
        );
        Ok(report)
    }

    fn merge_target(
        &self,
        session: &MergeSession<'_>,
        canonical: &str,
        contributions: &[Contribution<'_>],
    ) -> Result<()> {
        let Some(last) = contributions.last() else {
            return Ok(());
        };
        let game_version = self.rom.game_version();
        let attributes = last.entry.attributes;
        let dictionary = contributions
            .iter()
            .rev()
            .map(|c| c.entry.zs_dictionary_id)
            .find(|id| *id != 0)
            .unwrap_or(0);
        let parents = session.parents_of(canonical);
        let version = last.entry.select_version(game_version);
        let path = TkPath {
            root: ModRoot::Romfs,
            canonical: canonical.to_string(),
            version,
            attributes,
        };
        let handler = self.registry.resolve(&path);

        let mut base: Option<Vec<u8>> = None;
        let mut base_is_vanilla = true;
        let mut pending = Vec::new();
        for contribution in contributions {
            let entry = contribution.entry;
            let version = entry.select_version(game_version);
            match entry.kind {
                EntryType::Copy => {
                    base = Some(contribution.source.read(&content_path(canonical, version))?);
                    base_is_vanilla = false;
                    pending.clear();
                }
                EntryType::Changelog | EntryType::Placeholder => {
                    if base.as_deref() == Some(REMOVED_ENTRY) {
                        // A higher priority mod keeps the file; start over from vanilla
                        tracing::debug!("{}: removal overridden by a later entry", canonical);
                        base = None;
                        base_is_vanilla = true;
                    }
                    if entry.kind == EntryType::Changelog {
                        pending.push(contribution.source.read(&content_path(canonical, version))?);
                    }
                }
            }
        }

        if base_is_vanilla {
            base = self
                .resolve_vanilla(session, canonical, 0)?
                .map(|base| base.to_vec());
        }
        let Some(mut base) = base else {
            tracing::trace!("{}: no base to merge onto, skipped", canonical);
            return Ok(());
        };

        let removed = base == REMOVED_ENTRY;
        if !pending.is_empty() && !removed {
            let Some(handler) = handler else {
                return Err(Error::structure(canonical, "changelog entry without a handler"));
            };
            let ctx = MergeContext::new(self.rom);
            base = handler.merge(&ctx, &path, base, &pending)?;
        }

        if handler.is_some_and(|handler| handler.is_archive()) {
            session.collector.register(
                canonical,
                base,
                attributes,
                dictionary,
                parents,
                physical_name(canonical, attributes, version),
            );
            return Ok(());
        }

        if !parents.is_empty() {
            let data = if removed {
                base
            } else {
                self.compress(&base, attributes, dictionary)?
            };
            let name = physical_name(canonical, attributes, version);
            for parent in &parents {
                session.collector.add_entry(parent, name.clone(), data.clone());
            }
            return Ok(());
        }

        if removed {
            tracing::trace!("{}: removal marker outside an archive, skipped", canonical);
            return Ok(());
        }
        let output = format!("romfs/{}", self.rom.physical_path(canonical, attributes));
        session.sizes.lock().push((canonical.to_string(), base.len()));
        let data = self.compress(&base, attributes, dictionary)?;
        tracing::debug!("Writing {}", output);
        session.writer.write(&output, &data)
    }

    fn compress(&self, data: &[u8], attributes: FileAttributes, dictionary: u32) -> Result<Vec<u8>> {
        if attributes.contains(FileAttributes::ZS_COMPRESSED) {
            self.rom.zstd().compress(data, dictionary)
        } else {
            Ok(data.to_vec())
        }
    }

    /// Decompressed vanilla content of a top-level or nested canonical
    fn resolve_vanilla(
        &self,
        session: &MergeSession<'_>,
        canonical: &str,
        depth: usize,
    ) -> Result<Option<Arc<Vec<u8>>>> {
        if let Some(cached) = session.vanilla_cache.lock().get(canonical) {
            return Ok(cached.clone());
        }
        if depth > MAX_NESTING {
            tracing::warn!("{}: archive nesting too deep", canonical);
            return Ok(None);
        }

        let attributes = session.attributes(canonical);
        let parents = session.parents_of(canonical);
        let vanilla = if parents.is_empty() {
            let version = if attributes.contains(FileAttributes::PRODUCT_FILE) {
                self.rom.game_version()
            } else {
                -1
            };
            self.rom.get_vanilla(canonical, attributes, version)?
        } else {
            let mut found = None;
            for parent in &parents {
                let Some(archive) = self.resolve_vanilla(session, parent, depth + 1)? else {
                    continue;
                };
                let archive = Sarc::from_bytes(&archive)?;
                let name = physical_name(canonical, attributes, self.rom.game_version());
                let entry = archive
                    .get(&name)
                    .or_else(|| archive.get(&physical_name(canonical, attributes, -1)));
                if let Some(entry) = entry {
                    found = Some(self.rom.zstd().maybe_decompress(entry)?);
                    break;
                }
            }
            found
        };

        let vanilla = vanilla.map(Arc::new);
        session
            .vanilla_cache
            .lock()
            .insert(canonical.to_string(), vanilla.clone());
        Ok(vanilla)
    }

    fn write_size_table(&self, writer: &dyn ModWriter, sizes: &[(String, usize)]) -> Result<()> {
        if sizes.is_empty() {
            return Ok(());
        }
        let attributes = FileAttributes::PRODUCT_FILE | FileAttributes::ZS_COMPRESSED;
        let mut table = match self
            .rom
            .get_vanilla(RSTB_CANONICAL, attributes, self.rom.game_version())?
        {
            Some(data) => ResourceSizeTable::from_bytes(&data)?,
            None => ResourceSizeTable::new(),
        };
        for (canonical, size) in sizes {
            table.update(canonical, *size);
        }
        let path = format!("romfs/{}", self.rom.physical_path(RSTB_CANONICAL, attributes));
        tracing::debug!("Writing {} ({} entries)", path, table.len());
        writer.write(&path, &self.rom.zstd().compress(&table.to_bytes()?, 0)?)
    }
}

impl MergeSession<'_> {
    fn parents_of(&self, canonical: &str) -> BTreeSet<String> {
        self.parents.get(canonical).cloned().unwrap_or_default()
    }

    fn attributes(&self, canonical: &str) -> FileAttributes {
        self.attributes.get(canonical).copied().unwrap_or_else(|| {
            TkPath::nested(canonical).attributes
        })
    }
}

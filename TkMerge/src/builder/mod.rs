//! Building mod changelogs
//!
//! The [`Builder`] walks a mod's files, diffs every `romfs` file against
//! vanilla through the handler registry and writes the resulting changelog
//! entries plus their content to a [`ModWriter`]. Auxiliary files (`exefs`
//! patches and binaries, `cheats`) are copied through and listed in the
//! changelog.
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

pub mod source;

pub use source::{FolderSource, FolderWriter, MemorySource, MemoryWriter, ModSource, ModWriter};

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::canonical::{FileAttributes, ModRoot, TkPath};
use crate::changelog::{CHANGELOG_FILE, Changelog, ChangelogEntry, EntryType, content_path};
use crate::compression::{frame_dictionary_id, is_zstd};
use crate::error::{Error, Result};
use crate::handlers::{BuildContext, EntrySink, HandlerRegistry};
use crate::rom::TkRom;
use crate::utils::{BufferPool, CancellationToken, Phase, Progress, ProgressCallback};

/// Summary of one build
#[derive(Debug)]
pub struct BuildReport {
    /// The changelog that was written
    pub changelog: Changelog,
    /// Files looked at
    pub processed: usize,
    /// Files skipped as identical to vanilla or out of the version window
    pub skipped: usize,
    /// Files that failed, with their error
    pub failures: Vec<(String, Error)>,
}

impl BuildReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Where a file ended up
enum FileOutcome {
    Recorded,
    Skipped,
}

/// Builds changelogs for mods against one vanilla dump
pub struct Builder<'a> {
    rom: &'a dyn TkRom,
    registry: &'a HandlerRegistry,
    pool: BufferPool,
    cancel: CancellationToken,
}

impl<'a> Builder<'a> {
    #[must_use]
    pub fn new(rom: &'a dyn TkRom, registry: &'a HandlerRegistry) -> Self {
        Self {
            rom,
            registry,
            pool: BufferPool::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to cancel the build from another thread
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build one mod
    ///
    /// # Errors
    /// Returns an error when the source cannot be listed, output cannot be
    /// written, or the build was cancelled. Other per-file failures are
    /// collected in the report.
    pub fn build(&self, source: &dyn ModSource, writer: &dyn ModWriter) -> Result<BuildReport> {
        self.build_with_progress(source, writer, &|_| {})
    }

    /// [`Builder::build`] with progress updates
    pub fn build_with_progress(
        &self,
        source: &dyn ModSource,
        writer: &dyn ModWriter,
        progress: ProgressCallback<'_>,
    ) -> Result<BuildReport> {
        progress(&Progress::new(Phase::Scanning, 0, 0));
        let files = source.files()?;
        let total = files.len();
        tracing::info!("Building {} files", total);

        let session = BuildSession {
            changelog: Mutex::new(Changelog::new(self.rom.game_version().max(0) as u32)),
            writer,
        };
        let processed = AtomicUsize::new(0);

        let results: Vec<(String, Result<FileOutcome>)> = files
            .par_iter()
            .filter(|file| file.as_str() != CHANGELOG_FILE)
            .map(|file| {
                let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(&Progress::with_file(Phase::Building, current, total, file.as_str()));
                let result = self
                    .cancel
                    .check()
                    .and_then(|()| self.build_file(source, &session, file));
                (file.clone(), result)
            })
            .collect();

        let mut skipped = 0;
        let mut failures = Vec::new();
        for (file, result) in results {
            match result {
                Ok(FileOutcome::Recorded) => {}
                Ok(FileOutcome::Skipped) => skipped += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::error!("Failed to build {}: {}", file, err);
                    failures.push((file, err));
                }
            }
        }

        let mut changelog = session.changelog.into_inner();
        for list in [
            &mut changelog.mals,
            &mut changelog.patches,
            &mut changelog.cheats,
            &mut changelog.loader,
            &mut changelog.exe,
        ] {
            list.sort();
        }
        writer.write(CHANGELOG_FILE, &changelog.to_bytes()?)?;
        progress(&Progress::new(Phase::Complete, total, total));
        tracing::info!(
            "Built {} entries, {} skipped, {} failed",
            changelog.len(),
            skipped,
            failures.len()
        );

        Ok(BuildReport {
            changelog,
            processed: processed.into_inner(),
            skipped,
            failures,
        })
    }

    fn build_file(
        &self,
        source: &dyn ModSource,
        session: &BuildSession<'_>,
        file: &str,
    ) -> Result<FileOutcome> {
        let Some(path) = TkPath::from_mod_path(file) else {
            tracing::trace!("{}: outside any root, ignored", file);
            return Ok(FileOutcome::Skipped);
        };

        match path.root {
            ModRoot::Romfs => self.build_romfs(source, session, file, &path),
            ModRoot::Exefs | ModRoot::Cheats => {
                session.writer.write(file, &source.read(file)?)?;
                let mut changelog = session.changelog.lock();
                let list = match path.root {
                    ModRoot::Cheats => &mut changelog.cheats,
                    _ => {
                        let name = path.canonical.rsplit('/').next().unwrap_or_default();
                        let extension = path.extension();
                        if extension == "ips" || extension == "pchtxt" {
                            &mut changelog.patches
                        } else if name.starts_with("subsdk") {
                            &mut changelog.loader
                        } else {
                            &mut changelog.exe
                        }
                    }
                };
                list.push(file.to_string());
                Ok(FileOutcome::Recorded)
            }
            ModRoot::Other => {
                tracing::trace!("{}: not a game root, ignored", file);
                Ok(FileOutcome::Skipped)
            }
        }
    }

    fn build_romfs(
        &self,
        source: &dyn ModSource,
        session: &BuildSession<'_>,
        file: &str,
        path: &TkPath,
    ) -> Result<FileOutcome> {
        if path.canonical.starts_with("Mals/") {
            session.changelog.lock().mals.push(file.to_string());
        }

        let raw = source.read(file)?;
        let ctx = BuildContext::new(self.rom, self.registry, &self.pool, session);

        if path.attributes.contains(FileAttributes::MC_COMPRESSED) {
            tracing::debug!("{}: multi-component file copied raw", path);
            ctx.record(path, EntryType::Copy, Some(&raw), 0)?;
            return Ok(FileOutcome::Recorded);
        }

        let dictionary = if is_zstd(&raw) {
            frame_dictionary_id(&raw)
        } else {
            0
        };
        let buffer;
        let data = if is_zstd(&raw) {
            buffer = self.rom.zstd().decompress_pooled(&raw, &self.pool)?;
            buffer.as_slice()
        } else {
            raw.as_slice()
        };

        if self.rom.is_vanilla(&path.canonical, data, path.version) {
            tracing::trace!("{}: vanilla file, skipped", path);
            return Ok(FileOutcome::Skipped);
        }

        let vanilla = self
            .rom
            .get_vanilla(&path.canonical, path.attributes, path.version)?;
        if vanilla.is_none() && path.version >= 0 {
            tracing::trace!("{}: no vanilla file for this version, skipped", path);
            return Ok(FileOutcome::Skipped);
        }

        if ctx.process(path, data, vanilla.as_deref(), dictionary)? {
            Ok(FileOutcome::Recorded)
        } else {
            Ok(FileOutcome::Skipped)
        }
    }
}

/// Shared state of one build
struct BuildSession<'a> {
    changelog: Mutex<Changelog>,
    writer: &'a dyn ModWriter,
}

impl EntrySink for BuildSession<'_> {
    fn record(&self, entry: ChangelogEntry, content: Option<&[u8]>) -> Result<()> {
        // Content and entry are stored under one lock so the last writer owns both
        let mut changelog = self.changelog.lock();
        if let Some(content) = content {
            let version = entry.versions.iter().next().copied().unwrap_or(-1);
            self.writer
                .write(&content_path(&entry.canonical, version), content)?;
        }
        changelog.upsert(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TkConfig;
    use crate::formats::Byml;
    use crate::rom::{MemoryRom, TkRom};
    use pretty_assertions::assert_eq;

    fn actor(life: i32) -> Vec<u8> {
        Byml::map([("Life", Byml::Int(life))]).to_bytes().unwrap()
    }

    #[test]
    fn test_classifies_roots() {
        let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, actor(10));
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        let source = MemorySource::new()
            .with_file("romfs/Actor/Foo.byml", actor(20))
            .with_file("exefs/main.ips", b"PATCH".to_vec())
            .with_file("exefs/subsdk9", b"loader".to_vec())
            .with_file("exefs/main.npdm", b"npdm".to_vec())
            .with_file("cheats/0100.txt", b"cheat".to_vec())
            .with_file("readme.txt", b"hello".to_vec());
        let writer = MemoryWriter::new();

        let report = Builder::new(&rom, &registry).build(&source, &writer).unwrap();
        assert!(report.is_success());
        let changelog = &report.changelog;
        assert_eq!(changelog.get("Actor/Foo.byml").unwrap().kind, EntryType::Changelog);
        assert_eq!(changelog.patches, vec!["exefs/main.ips".to_string()]);
        assert_eq!(changelog.loader, vec!["exefs/subsdk9".to_string()]);
        assert_eq!(changelog.exe, vec!["exefs/main.npdm".to_string()]);
        assert_eq!(changelog.cheats, vec!["cheats/0100.txt".to_string()]);
        assert!(writer.get("romfs/Actor/Foo.byml").is_some());
        assert!(writer.get(CHANGELOG_FILE).is_some());
    }

    #[test]
    fn test_new_file_is_copied() {
        let rom = MemoryRom::new(121);
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        let source = MemorySource::new().with_file("romfs/Actor/New.byml", actor(1));
        let writer = MemoryWriter::new();

        let report = Builder::new(&rom, &registry).build(&source, &writer).unwrap();
        assert_eq!(report.changelog.get("Actor/New.byml").unwrap().kind, EntryType::Copy);
        assert_eq!(writer.get("romfs/Actor/New.byml"), Some(actor(1)));
    }

    #[test]
    fn test_same_canonical_twice_keeps_entry_and_content_paired() {
        let rom = MemoryRom::new(121);
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        let compressed = rom.zstd().compress(&actor(30), 0).unwrap();

        for _ in 0..8 {
            let source = MemorySource::new()
                .with_file("romfs/Actor/Foo.byml", actor(20))
                .with_file("romfs/Actor/Foo.byml.zs", compressed.clone());
            let writer = MemoryWriter::new();

            let report = Builder::new(&rom, &registry).build(&source, &writer).unwrap();
            assert!(report.is_success());
            assert_eq!(report.changelog.len(), 1);
            let entry = report.changelog.get("Actor/Foo.byml").unwrap();
            let content = writer.get(&content_path("Actor/Foo.byml", -1)).unwrap();
            let expected = if entry.attributes.contains(FileAttributes::ZS_COMPRESSED) {
                actor(30)
            } else {
                actor(20)
            };
            assert_eq!(content, expected);
        }
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, actor(10));
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        let source = MemorySource::new().with_file("romfs/Actor/Foo.byml", b"YB\x07".to_vec());
        let writer = MemoryWriter::new();

        let report = Builder::new(&rom, &registry).build(&source, &writer).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.changelog.is_empty());
    }

    #[test]
    fn test_cancelled_build() {
        let rom = MemoryRom::new(121);
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        let source = MemorySource::new().with_file("romfs/Actor/New.byml", actor(1));
        let token = CancellationToken::new();
        token.cancel();

        let result = Builder::new(&rom, &registry)
            .with_cancellation(token)
            .build(&source, &MemoryWriter::new());
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

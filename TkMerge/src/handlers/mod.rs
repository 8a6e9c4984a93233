//! Format handlers and the dispatch table
//!
//! A [`FormatHandler`] knows how to diff one file format against vanilla and
//! how to replay its changelogs. The [`HandlerRegistry`] maps a canonical path
//! to the handler responsible for it, in priority order:
//!
//! 1. archive extensions ([`PackHandler`])
//! 2. the RSDB, tag and GameData tables
//! 3. `.msbt` message tables
//! 4. `.byml` / `.bgyml` trees
//!
//! Anything else has no handler and is copied raw.
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

mod byml;
mod msbt;
mod pack;
mod tables;

pub use byml::TreeHandler;
pub use msbt::MsbtHandler;
pub use pack::PackHandler;
pub use tables::{GameDataHandler, RsdbHandler, TagHandler};

use std::fmt;
use std::sync::Arc;

use crate::canonical::TkPath;
use crate::changelog::{ChangelogEntry, EntryType};
use crate::config::TkConfig;
use crate::error::Result;
use crate::rom::TkRom;
use crate::tables::{GAME_DATA_CANONICAL, GameDataIndex, TAG_CANONICAL, TableIndex, default_tables};
use crate::utils::BufferPool;

/// Result of diffing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Nothing changed
    Empty,
    /// Encoded changelog content
    Changelog(Vec<u8>),
    /// Changes were recorded as nested entries; the file itself only needs
    /// to exist in the merged output
    Placeholder,
}

/// Receives the entries produced while building
pub trait EntrySink: Send + Sync {
    /// Record `entry`, storing `content` for its version when given
    fn record(&self, entry: ChangelogEntry, content: Option<&[u8]>) -> Result<()>;
}

/// Everything a handler needs while building
pub struct BuildContext<'a> {
    pub rom: &'a dyn TkRom,
    pub registry: &'a HandlerRegistry,
    pub pool: &'a BufferPool,
    pub sink: &'a dyn EntrySink,
    /// Canonical of the archive currently being walked
    pub parent: Option<&'a str>,
}

impl<'a> BuildContext<'a> {
    #[must_use]
    pub fn new(
        rom: &'a dyn TkRom,
        registry: &'a HandlerRegistry,
        pool: &'a BufferPool,
        sink: &'a dyn EntrySink,
    ) -> Self {
        Self {
            rom,
            registry,
            pool,
            sink,
            parent: None,
        }
    }

    /// Context for the entries of archive `parent`
    #[must_use]
    pub fn nested<'b>(&'b self, parent: &'b str) -> BuildContext<'b> {
        BuildContext {
            rom: self.rom,
            registry: self.registry,
            pool: self.pool,
            sink: self.sink,
            parent: Some(parent),
        }
    }

    /// Version used to look up vanilla tables for a file of `version`
    #[must_use]
    pub fn table_version(&self, version: i32) -> i32 {
        if version >= 0 { version } else { self.rom.game_version() }
    }

    /// Diff one decompressed file and record the result
    ///
    /// Returns whether an entry was recorded. Identical files and top-level
    /// files with an empty diff record nothing; nested files with an empty
    /// diff are recorded as placeholders.
    pub fn process(
        &self,
        path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
        dictionary: u32,
    ) -> Result<bool> {
        let handler = self.registry.resolve(path);
        let (kind, content) = match (vanilla, handler) {
            (Some(vanilla), _) if vanilla == source => {
                tracing::trace!("{}: identical to vanilla", path);
                return Ok(false);
            }
            (Some(vanilla), Some(handler)) => {
                match handler.build(self, path, source, Some(vanilla))? {
                    BuildOutcome::Empty if self.parent.is_none() => {
                        tracing::trace!("{}: no effective change", path);
                        return Ok(false);
                    }
                    BuildOutcome::Empty | BuildOutcome::Placeholder => (EntryType::Placeholder, None),
                    BuildOutcome::Changelog(content) => (EntryType::Changelog, Some(content)),
                }
            }
            (None, Some(handler)) if !handler.requires_vanilla() => {
                match handler.build(self, path, source, None)? {
                    BuildOutcome::Empty => (EntryType::Copy, Some(source.to_vec())),
                    BuildOutcome::Placeholder => (EntryType::Placeholder, None),
                    BuildOutcome::Changelog(content) => (EntryType::Changelog, Some(content)),
                }
            }
            _ => (EntryType::Copy, Some(source.to_vec())),
        };

        tracing::debug!("{}: {:?} via {}", path, kind, handler.map_or("raw", |h| h.name()));
        self.record(path, kind, content.as_deref(), dictionary)?;
        Ok(true)
    }

    /// Record an entry for `path` under the current parent archive
    pub fn record(
        &self,
        path: &TkPath,
        kind: EntryType,
        content: Option<&[u8]>,
        dictionary: u32,
    ) -> Result<()> {
        let mut entry = ChangelogEntry::new(path.canonical.clone(), kind, path.attributes)
            .with_version(path.version)
            .with_dictionary(dictionary);
        if let Some(parent) = self.parent {
            entry = entry.with_parent(parent);
        }
        self.sink.record(entry, content)
    }
}

/// Everything a handler needs while merging
pub struct MergeContext<'a> {
    pub rom: &'a dyn TkRom,
}

impl<'a> MergeContext<'a> {
    #[must_use]
    pub fn new(rom: &'a dyn TkRom) -> Self {
        Self { rom }
    }

    /// Game version the merged output targets
    #[must_use]
    pub fn game_version(&self) -> i32 {
        self.rom.game_version()
    }
}

/// Diff and merge support for one file format
///
/// Handlers are stateless across files and shared between worker threads.
pub trait FormatHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether [`FormatHandler::build`] needs a vanilla file; without one the
    /// source is copied as-is
    fn requires_vanilla(&self) -> bool {
        true
    }

    /// Whether merged output is collected and written as an archive
    fn is_archive(&self) -> bool {
        false
    }

    /// Diff decompressed `source` against decompressed `vanilla`
    fn build(
        &self,
        ctx: &BuildContext<'_>,
        path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome>;

    /// Replay `changelogs`, lowest priority first, onto `base`
    fn merge(
        &self,
        ctx: &MergeContext<'_>,
        path: &TkPath,
        base: Vec<u8>,
        changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>>;
}

/// Precompiled indices for the keyed tables
#[derive(Debug, Clone, Default)]
pub struct TableIndices {
    pub rsdb: TableIndex,
    pub game_data: GameDataIndex,
}

type Predicate = Box<dyn Fn(&TkPath) -> bool + Send + Sync>;

/// Ordered (predicate, handler) dispatch table
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<(Predicate, Arc<dyn FormatHandler>)>,
}

impl HandlerRegistry {
    /// An empty registry; every file is copied raw
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard dispatch table without table indices
    #[must_use]
    pub fn from_config(config: &TkConfig) -> Self {
        Self::with_indices(config, TableIndices::default())
    }

    /// The standard dispatch table
    #[must_use]
    pub fn with_indices(config: &TkConfig, indices: TableIndices) -> Self {
        let mut registry = Self::new();
        let rules = config.array_rules.clone();
        let rsdb = Arc::new(indices.rsdb);

        let extensions = config.pack_extensions.clone();
        registry.register(
            move |path| {
                let extension = path.extension();
                extensions.iter().any(|ext| ext.eq_ignore_ascii_case(&extension))
            },
            Arc::new(PackHandler),
        );

        let tag = Arc::new(TagHandler::new(Arc::clone(&rsdb)));
        registry.register(|path| path.canonical == TAG_CANONICAL, tag);

        for table in default_tables().into_iter().chain(config.extra_rsdb_tables.iter().cloned()) {
            let canonical = table.canonical();
            let handler = RsdbHandler::new(
                table,
                Arc::clone(&rsdb),
                rules.clone(),
                config.track_rsdb_removals,
            );
            registry.register(move |path| path.canonical == canonical, Arc::new(handler));
        }

        registry.register(
            |path| path.canonical == GAME_DATA_CANONICAL,
            Arc::new(GameDataHandler::new(Arc::new(indices.game_data), rules.clone())),
        );
        registry.register(|path| path.extension() == "msbt", Arc::new(MsbtHandler));
        registry.register(
            |path| matches!(path.extension().as_str(), "byml" | "bgyml"),
            Arc::new(TreeHandler::new(rules)),
        );
        registry
    }

    /// Append a handler; earlier registrations take priority
    pub fn register(
        &mut self,
        predicate: impl Fn(&TkPath) -> bool + Send + Sync + 'static,
        handler: Arc<dyn FormatHandler>,
    ) {
        self.handlers.push((Box::new(predicate), handler));
    }

    /// Handler for `path`, or `None` for a raw copy
    #[must_use]
    pub fn resolve(&self, path: &TkPath) -> Option<&dyn FormatHandler> {
        self.handlers
            .iter()
            .find(|(predicate, _)| predicate(path))
            .map(|(_, handler)| handler.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|(_, handler)| handler.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ModRoot;
    use pretty_assertions::assert_eq;

    fn resolve(registry: &HandlerRegistry, path: &str) -> Option<&'static str> {
        registry
            .resolve(&TkPath::new(path, ModRoot::Romfs))
            .map(|handler| handler.name())
    }

    #[test]
    fn test_dispatch_order() {
        let registry = HandlerRegistry::from_config(&TkConfig::default());
        assert_eq!(resolve(&registry, "Pack/Actor/Foo.pack.zs"), Some("pack"));
        assert_eq!(resolve(&registry, "RSDB/Tag.Product.121.rstbl.byml.zs"), Some("tag"));
        assert_eq!(resolve(&registry, "RSDB/ActorInfo.Product.121.rstbl.byml.zs"), Some("rsdb"));
        assert_eq!(
            resolve(&registry, "GameData/GameDataList.Product.121.byml.zs"),
            Some("game_data")
        );
        assert_eq!(resolve(&registry, "Mals/USen/Foo.msbt"), Some("msbt"));
        // Unknown RSDB tables fall through to the generic tree handler
        assert_eq!(resolve(&registry, "RSDB/Unknown.Product.121.rstbl.byml.zs"), Some("byml"));
        assert_eq!(resolve(&registry, "Component/Foo.engine__Param.bgyml"), Some("byml"));
        assert_eq!(resolve(&registry, "Sound/Resource/Foo.bwav"), None);
    }

    #[test]
    fn test_extra_rsdb_tables() {
        let config = TkConfig::from_json(
            r#"{ "extra_rsdb_tables": [{ "name": "NpcInfo", "key": "RowId" }] }"#,
        )
        .unwrap();
        let registry = HandlerRegistry::from_config(&config);
        assert_eq!(resolve(&registry, "RSDB/NpcInfo.Product.121.rstbl.byml.zs"), Some("rsdb"));
        assert_eq!(format!("{registry:?}").matches("rsdb").count(), default_tables().len() + 1);
    }
}

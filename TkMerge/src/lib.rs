#![allow(non_snake_case)]
//! # TkMerge
//!
//! A pure-Rust changelog engine for Tears of the Kingdom mods.
//!
//! Mods are *built* once against a vanilla dump: every file a mod touches is
//! reduced to a changelog entry holding only its effective changes. Any number
//! of built mods can then be *merged* back onto vanilla in priority order.
//!
//! ## Supported Formats
//!
//! - **BYML** - Binary YAML trees (`.byml`, `.bgyml`), diffed field by field
//! - **SARC** - Archives (`.pack`, `.sarc`, ...), walked entry by entry
//! - **RSDB** - Keyed resource database tables, diffed per row
//! - **Tag table** - Actor tag bitsets, diffed per path triplet
//! - **GameData** - Flag lists, diffed per hash
//! - **MSBT** - Message tables, diffed per label
//!
//! ## Quick Start
//!
//! ```no_run
//! use tkmerge::prelude::*;
//!
//! let rom = ExtractedRom::open("dump/romfs", 121, 16)?;
//! let registry = HandlerRegistry::from_config(&TkConfig::default());
//!
//! // Build one mod
//! let report = Builder::new(&rom, &registry)
//!     .build(&FolderSource::new("mods/MyMod"), &FolderWriter::new("built/MyMod"))?;
//! println!("{} entries", report.changelog.len());
//!
//! // Merge built mods, highest priority first
//! let a = FolderSource::new("built/MyMod");
//! let b = FolderSource::new("built/Other");
//! Merger::new(&rom, &registry).merge(&[&a, &b], &FolderWriter::new("merged"))?;
//! # Ok::<(), tkmerge::Error>(())
//! ```

pub mod builder;
pub mod canonical;
pub mod changelog;
pub mod compression;
pub mod config;
pub mod diff;
pub mod error;
pub mod formats;
pub mod handlers;
pub mod merger;
pub mod rom;
pub mod tables;
pub mod utils;

// Re-exports for convenience
pub use error::{Error, Result};

/// Version of the changelog builder written into every changelog
pub const BUILDER_VERSION: u32 = 1;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::builder::{
        BuildReport, Builder, FolderSource, FolderWriter, MemorySource, MemoryWriter, ModSource,
        ModWriter,
    };
    pub use crate::canonical::{FileAttributes, ModRoot, TkPath};
    pub use crate::changelog::{Changelog, ChangelogEntry, EntryType};
    pub use crate::config::TkConfig;
    pub use crate::diff::{ArrayRules, diff_byml, merge_changelogs};
    pub use crate::error::{Error, Result};
    pub use crate::formats::{Byml, Msbt, Sarc};
    pub use crate::handlers::{FormatHandler, HandlerRegistry, TableIndices};
    pub use crate::merger::{MergeReport, Merger};
    pub use crate::rom::{ExtractedRom, MemoryRom, TkRom};
    pub use crate::utils::{CancellationToken, Phase, Progress};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

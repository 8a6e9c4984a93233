//! Nested archive handler
//!
//! Archives are not diffed as a whole. Each entry is resolved through the
//! dispatch table by its own name and recorded as a separate changelog entry
//! whose parent is the archive; the archive itself becomes a placeholder that
//! the merger rebuilds from vanilla plus the merged entries.

use crate::canonical::TkPath;
use crate::changelog::EntryType;
use crate::compression::is_zstd;
use crate::error::Result;
use crate::formats::{REMOVED_ENTRY, Sarc};

use super::{BuildContext, BuildOutcome, FormatHandler, MergeContext};

/// Walks archive entries
#[derive(Debug, Clone, Copy, Default)]
pub struct PackHandler;

impl FormatHandler for PackHandler {
    fn name(&self) -> &'static str {
        "pack"
    }

    fn requires_vanilla(&self) -> bool {
        false
    }

    fn is_archive(&self) -> bool {
        true
    }

    fn build(
        &self,
        ctx: &BuildContext<'_>,
        path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome> {
        let source = Sarc::from_bytes(source)?;
        let vanilla = vanilla.map(Sarc::from_bytes).transpose()?;
        let nested = ctx.nested(&path.canonical);
        let mut changed = false;

        for (name, data) in source.iter() {
            let entry_path = TkPath::nested(name);
            let source_buffer;
            let data = if is_zstd(data) {
                source_buffer = ctx.rom.zstd().decompress_pooled(data, ctx.pool)?;
                source_buffer.as_slice()
            } else {
                data
            };

            let recorded = match vanilla.as_ref().and_then(|pack| pack.get(name)) {
                Some(vanilla_entry) => {
                    let vanilla_buffer;
                    let vanilla_entry = if is_zstd(vanilla_entry) {
                        vanilla_buffer = ctx.rom.zstd().decompress_pooled(vanilla_entry, ctx.pool)?;
                        vanilla_buffer.as_slice()
                    } else {
                        vanilla_entry
                    };
                    nested.process(&entry_path, data, Some(vanilla_entry), 0)?
                }
                None => {
                    // Custom entry: copied whatever its format
                    nested.record(&entry_path, EntryType::Copy, Some(data), 0)?;
                    true
                }
            };
            changed |= recorded;
        }

        if let Some(vanilla) = &vanilla {
            for (name, _) in vanilla.iter().filter(|(name, _)| !source.contains(name)) {
                tracing::debug!("{}: entry {} removed", path, name);
                nested.record(&TkPath::nested(name), EntryType::Copy, Some(REMOVED_ENTRY), 0)?;
                changed = true;
            }
        } else {
            changed = true;
        }

        Ok(if changed {
            BuildOutcome::Placeholder
        } else {
            BuildOutcome::Empty
        })
    }

    fn merge(
        &self,
        _ctx: &MergeContext<'_>,
        _path: &TkPath,
        base: Vec<u8>,
        _changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        // Entries are merged as their own targets and collected into the archive
        Ok(base)
    }
}

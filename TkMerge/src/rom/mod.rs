//! Vanilla resource access
//!
//! The engine never reads the game dump directly. Everything it needs from the
//! unmodified game goes through [`TkRom`], which decouples diffing and merging
//! from how the dump is stored.
//!
//! The crate ships [`MemoryRom`] (an in-memory file table, useful for tests
//! and for hosts that already hold the files) and [`ExtractedRom`] (an
//! extracted romfs directory).

mod extracted;
mod memory;

pub use extracted::ExtractedRom;
pub use memory::MemoryRom;

use crate::canonical::{FileAttributes, physical_name};
use crate::compression::ZstdCodec;
use crate::error::Result;

/// Supplies unmodified game files.
///
/// Implementations must be [`Send`] and [`Sync`]: builds and merges query the
/// provider from many worker threads at once.
pub trait TkRom: Send + Sync {
    /// Game version the dump belongs to (e.g. `121`)
    fn game_version(&self) -> i32;

    /// Decompressed vanilla content of `canonical`.
    ///
    /// `version` is the file-format version from a `Product.<version>` name,
    /// or `-1` for unversioned files. Returns `Ok(None)` when the dump has no
    /// such file.
    fn get_vanilla(
        &self,
        canonical: &str,
        attributes: FileAttributes,
        version: i32,
    ) -> Result<Option<Vec<u8>>>;

    /// Whether `data` (decompressed) is byte-identical to a vanilla copy of `canonical`.
    fn is_vanilla(&self, canonical: &str, data: &[u8], version: i32) -> bool;

    /// Codec with the game's compression dictionaries loaded
    fn zstd(&self) -> &ZstdCodec;

    /// Physical romfs-relative path to write a canonical file to.
    ///
    /// Versioned files are written for this dump's game version.
    fn physical_path(&self, canonical: &str, attributes: FileAttributes) -> String {
        let version = if attributes.contains(FileAttributes::PRODUCT_FILE) {
            self.game_version()
        } else {
            -1
        };
        physical_name(canonical, attributes, version)
    }
}

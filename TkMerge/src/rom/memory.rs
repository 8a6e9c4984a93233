//! In-memory vanilla provider

use std::collections::{HashMap, HashSet};

use crate::canonical::FileAttributes;
use crate::compression::ZstdCodec;
use crate::error::Result;
use crate::utils::checksum;

use super::TkRom;

/// Vanilla files held in memory, with an xxh3 checksum table
#[derive(Debug, Clone, Default)]
pub struct MemoryRom {
    game_version: i32,
    files: HashMap<(String, i32), Vec<u8>>,
    checksums: HashMap<String, HashSet<u64>>,
    codec: ZstdCodec,
}

impl MemoryRom {
    #[must_use]
    pub fn new(game_version: i32) -> Self {
        Self {
            game_version,
            ..Self::default()
        }
    }

    /// Replace the codec (e.g. one with dictionaries loaded)
    #[must_use]
    pub fn with_codec(mut self, codec: ZstdCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Builder-style [`MemoryRom::insert`]
    #[must_use]
    pub fn with_file(mut self, canonical: &str, version: i32, data: Vec<u8>) -> Self {
        self.insert(canonical, version, data);
        self
    }

    /// Add a decompressed vanilla file
    pub fn insert(&mut self, canonical: &str, version: i32, data: Vec<u8>) {
        self.checksums
            .entry(canonical.to_string())
            .or_default()
            .insert(checksum(&data));
        self.files.insert((canonical.to_string(), version), data);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl TkRom for MemoryRom {
    fn game_version(&self) -> i32 {
        self.game_version
    }

    fn get_vanilla(
        &self,
        canonical: &str,
        _attributes: FileAttributes,
        version: i32,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(&(canonical.to_string(), version)).cloned())
    }

    fn is_vanilla(&self, canonical: &str, data: &[u8], _version: i32) -> bool {
        self.checksums
            .get(canonical)
            .is_some_and(|sums| sums.contains(&checksum(data)))
    }

    fn zstd(&self) -> &ZstdCodec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_version() {
        let rom = MemoryRom::new(121)
            .with_file("RSDB/Tag.Product.rstbl.byml", 121, b"v121".to_vec())
            .with_file("Actor/Foo.byml", -1, b"foo".to_vec());

        let attrs = FileAttributes::PRODUCT_FILE;
        assert_eq!(
            rom.get_vanilla("RSDB/Tag.Product.rstbl.byml", attrs, 121).unwrap(),
            Some(b"v121".to_vec())
        );
        assert_eq!(rom.get_vanilla("RSDB/Tag.Product.rstbl.byml", attrs, 100).unwrap(), None);
        assert!(rom.is_vanilla("Actor/Foo.byml", b"foo", -1));
        assert!(!rom.is_vanilla("Actor/Foo.byml", b"bar", -1));
    }

    #[test]
    fn test_physical_path_uses_game_version() {
        let rom = MemoryRom::new(121);
        let attrs = FileAttributes::PRODUCT_FILE | FileAttributes::ZS_COMPRESSED;
        assert_eq!(
            rom.physical_path("RSDB/Tag.Product.rstbl.byml", attrs),
            "RSDB/Tag.Product.121.rstbl.byml.zs"
        );
    }
}

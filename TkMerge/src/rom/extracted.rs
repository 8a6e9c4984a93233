//! Vanilla provider backed by an extracted romfs directory

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::canonical::{FileAttributes, ModRoot, TkPath, mod_relative};
use crate::compression::{ZstdCodec, is_zstd};
use crate::error::Result;
use crate::formats::Sarc;
use crate::utils::checksum;

use super::TkRom;

/// Canonical name of the archive holding the zstd dictionaries
const DICTIONARY_PACK: &str = "Pack/ZsDic.pack";

/// An extracted romfs dump on disk
///
/// The directory is indexed once on open; file content is read on demand.
#[derive(Debug)]
pub struct ExtractedRom {
    root: PathBuf,
    game_version: i32,
    /// canonical -> (file version, physical path)
    index: HashMap<String, Vec<(i32, PathBuf)>>,
    checksums: Mutex<HashMap<(String, i32), Option<u64>>>,
    codec: ZstdCodec,
}

impl ExtractedRom {
    /// Index a romfs dump
    ///
    /// Loads compression dictionaries from `Pack/ZsDic.pack.zs` when present.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked.
    pub fn open<P: AsRef<Path>>(root: P, game_version: i32, zstd_level: i32) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut index: HashMap<String, Vec<(i32, PathBuf)>> = HashMap::new();

        for entry in WalkDir::new(&root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = mod_relative(entry.path(), root.as_path()) else {
                continue;
            };
            let path = TkPath::new(&relative, ModRoot::Romfs);
            index
                .entry(path.canonical)
                .or_default()
                .push((path.version, entry.path().to_path_buf()));
        }
        tracing::debug!("Indexed {} vanilla files under {}", index.len(), root.display());

        let mut rom = Self {
            root,
            game_version,
            index,
            checksums: Mutex::new(HashMap::new()),
            codec: ZstdCodec::new(zstd_level),
        };
        rom.load_dictionaries()?;
        Ok(rom)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_dictionaries(&mut self) -> Result<()> {
        let Some(data) = self.read(DICTIONARY_PACK, -1)? else {
            tracing::debug!("No dictionary pack, zstd dictionaries unavailable");
            return Ok(());
        };
        let pack = Sarc::from_bytes(&data)?;
        for (name, dictionary) in pack.iter() {
            if name.ends_with(".zsdic") {
                self.codec.add_dictionary(dictionary.to_vec())?;
            }
        }
        Ok(())
    }

    fn read(&self, canonical: &str, version: i32) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.index.get(canonical).and_then(|files| {
            files
                .iter()
                .find(|(file_version, _)| *file_version == version)
                .map(|(_, path)| path)
        }) else {
            return Ok(None);
        };
        let data = fs::read(path)?;
        if is_zstd(&data) {
            Ok(Some(self.codec.decompress(&data)?))
        } else {
            Ok(Some(data))
        }
    }
}

impl TkRom for ExtractedRom {
    fn game_version(&self) -> i32 {
        self.game_version
    }

    fn get_vanilla(
        &self,
        canonical: &str,
        _attributes: FileAttributes,
        version: i32,
    ) -> Result<Option<Vec<u8>>> {
        self.read(canonical, version)
    }

    fn is_vanilla(&self, canonical: &str, data: &[u8], version: i32) -> bool {
        let key = (canonical.to_string(), version);
        let cached = self.checksums.lock().get(&key).copied();
        let vanilla = match cached {
            Some(sum) => sum,
            None => {
                let sum = match self.read(canonical, version) {
                    Ok(data) => data.map(|data| checksum(&data)),
                    Err(err) => {
                        tracing::warn!("Failed to read vanilla {}: {}", canonical, err);
                        None
                    }
                };
                self.checksums.lock().insert(key, sum);
                sum
            }
        };
        vanilla == Some(checksum(data))
    }

    fn zstd(&self) -> &ZstdCodec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexes_versions_and_decompresses() {
        let dir = tempfile::tempdir().unwrap();
        let rsdb = dir.path().join("RSDB");
        fs::create_dir_all(&rsdb).unwrap();

        let codec = ZstdCodec::new(3);
        fs::write(
            rsdb.join("Tag.Product.110.rstbl.byml.zs"),
            codec.compress(b"v110", 0).unwrap(),
        )
        .unwrap();
        fs::write(rsdb.join("Tag.Product.121.rstbl.byml.zs"), codec.compress(b"v121", 0).unwrap())
            .unwrap();
        fs::write(dir.path().join("plain.txt"), b"plain").unwrap();

        let rom = ExtractedRom::open(dir.path(), 121, 3).unwrap();
        let attrs = FileAttributes::PRODUCT_FILE | FileAttributes::ZS_COMPRESSED;
        assert_eq!(
            rom.get_vanilla("RSDB/Tag.Product.rstbl.byml", attrs, 110).unwrap(),
            Some(b"v110".to_vec())
        );
        assert_eq!(
            rom.get_vanilla("plain.txt", FileAttributes::empty(), -1).unwrap(),
            Some(b"plain".to_vec())
        );
        assert!(rom.is_vanilla("RSDB/Tag.Product.rstbl.byml", b"v121", 121));
        assert!(!rom.is_vanilla("RSDB/Tag.Product.rstbl.byml", b"modded", 121));
        assert!(!rom.is_vanilla("missing.byml", b"", -1));
    }
}

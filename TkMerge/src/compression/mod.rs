//! Compression utilities
//!
//! Romfs files with a `.zs` suffix are zstd frames, optionally compressed
//! against one of a handful of shared dictionaries. The dictionary id is
//! recorded in the frame header, so decompression picks the dictionary on its
//! own; compression needs the id the original file used, which the builder
//! stores in the changelog entry.
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::utils::{BufferPool, PooledBuffer};

/// Zstd frame magic (little-endian `0xFD2FB528`)
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level
pub const DEFAULT_LEVEL: i32 = 16;

/// Whether `data` starts with a zstd frame
#[must_use]
pub fn is_zstd(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

/// Dictionary id recorded in a zstd frame header, or `0`
#[must_use]
pub fn frame_dictionary_id(data: &[u8]) -> u32 {
    zstd::zstd_safe::get_dict_id_from_frame(data).map_or(0, |id| id.get())
}

/// Zstd codec with a registry of dictionaries keyed by id
#[derive(Debug, Clone)]
pub struct ZstdCodec {
    level: i32,
    dictionaries: HashMap<u32, Vec<u8>>,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl ZstdCodec {
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self {
            level,
            dictionaries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Register a trained dictionary, returning its id
    ///
    /// # Errors
    /// Returns an error if the data is not a zstd dictionary with an id.
    pub fn add_dictionary(&mut self, dictionary: Vec<u8>) -> Result<u32> {
        let id = zstd::zstd_safe::get_dict_id_from_dict(&dictionary)
            .map(|id| id.get())
            .ok_or_else(|| Error::Zstd("data is not a zstd dictionary".to_string()))?;
        tracing::debug!("Registered zstd dictionary {}", id);
        self.dictionaries.insert(id, dictionary);
        Ok(id)
    }

    #[must_use]
    pub fn has_dictionary(&self, id: u32) -> bool {
        self.dictionaries.contains_key(&id)
    }

    /// Decompress one frame, using the dictionary named in its header
    ///
    /// # Errors
    /// Returns [`Error::MissingDictionary`] when the frame needs a dictionary
    /// that was never registered, or [`Error::Zstd`] for corrupt data.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4);
        self.decompress_into(data, &mut out)?;
        Ok(out)
    }

    /// Decompress into a scratch buffer borrowed from `pool`
    pub fn decompress_pooled<'a>(
        &self,
        data: &[u8],
        pool: &'a BufferPool,
    ) -> Result<PooledBuffer<'a>> {
        let mut buffer = pool.get(data.len() * 4);
        self.decompress_into(data, &mut buffer)?;
        Ok(buffer)
    }

    fn decompress_into(&self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let dict_id = frame_dictionary_id(data);
        let result = if dict_id == 0 {
            zstd::stream::read::Decoder::new(data).and_then(|mut d| d.read_to_end(out))
        } else {
            let dictionary = self
                .dictionaries
                .get(&dict_id)
                .ok_or(Error::MissingDictionary(dict_id))?;
            zstd::stream::read::Decoder::with_dictionary(data, dictionary)
                .and_then(|mut d| d.read_to_end(out))
        };
        result.map_err(|e| Error::Zstd(format!("decompress: {e}")))?;
        Ok(())
    }

    /// Compress `data`, against dictionary `dict_id` when non-zero
    ///
    /// # Errors
    /// Returns [`Error::MissingDictionary`] for an unknown non-zero id.
    pub fn compress(&self, data: &[u8], dict_id: u32) -> Result<Vec<u8>> {
        if dict_id == 0 {
            return zstd::encode_all(data, self.level)
                .map_err(|e| Error::Zstd(format!("compress: {e}")));
        }

        let dictionary = self
            .dictionaries
            .get(&dict_id)
            .ok_or(Error::MissingDictionary(dict_id))?;
        let mut encoder =
            zstd::stream::write::Encoder::with_dictionary(Vec::new(), self.level, dictionary)
                .map_err(|e| Error::Zstd(format!("compress: {e}")))?;
        encoder
            .write_all(data)
            .map_err(|e| Error::Zstd(format!("compress: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::Zstd(format!("compress: {e}")))
    }

    /// Decompress if `data` is a zstd frame, otherwise return it unchanged
    pub fn maybe_decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if is_zstd(data) {
            self.decompress(data)
        } else {
            Ok(data.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_without_dictionary() {
        let codec = ZstdCodec::new(3);
        let data = b"Tears of the Kingdom ".repeat(64);
        let compressed = codec.compress(&data, 0).unwrap();
        assert!(is_zstd(&compressed));
        assert_eq!(frame_dictionary_id(&compressed), 0);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_unknown_dictionary() {
        let codec = ZstdCodec::default();
        assert!(matches!(
            codec.compress(b"abc", 7),
            Err(Error::MissingDictionary(7))
        ));
    }

    #[test]
    fn test_pooled_buffer_returns() {
        let codec = ZstdCodec::new(1);
        let pool = BufferPool::new(2);
        let compressed = codec.compress(b"pooled", 0).unwrap();
        {
            let out = codec.decompress_pooled(&compressed, &pool).unwrap();
            assert_eq!(out.as_slice(), b"pooled");
        }
        assert_eq!(pool.idle(), (1, 0, 0));
    }

    #[test]
    fn test_maybe_decompress_passthrough() {
        let codec = ZstdCodec::default();
        assert_eq!(codec.maybe_decompress(b"YB\x07\x00").unwrap(), b"YB\x07\x00");
    }
}

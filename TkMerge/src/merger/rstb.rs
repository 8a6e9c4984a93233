//! Resource size table
//!
//! The game preallocates memory for each resource from this table, so every
//! file the merge grows must have its entry raised.
//!
//! Layout (little-endian): `RSTB`, u32 count, then `(u32 crc32 of the
//! canonical, u32 size)` pairs sorted by hash.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::utils::name_hash;

/// Canonical path of the table in romfs
pub const RSTB_CANONICAL: &str = "System/Resource/ResourceSizeTable.Product.rsizetable";

const MAGIC: [u8; 4] = *b"RSTB";
/// Fixed overhead added to every estimate
const RESOURCE_OVERHEAD: u32 = 0x100;

/// Decoded resource size table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSizeTable {
    sizes: BTreeMap<u32, u32>,
}

impl ResourceSizeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(|_| Error::UnexpectedEof)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic {
                format: "RSTB",
                expected: &MAGIC,
                found: magic.to_vec(),
            });
        }
        let count = cursor.read_u32::<LittleEndian>()?;
        let mut sizes = BTreeMap::new();
        for _ in 0..count {
            let hash = cursor.read_u32::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()?;
            sizes.insert(hash, size);
        }
        Ok(Self { sizes })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(8 + self.sizes.len() * 8);
        out.extend_from_slice(&MAGIC);
        out.write_u32::<LittleEndian>(self.sizes.len() as u32)?;
        for (hash, size) in &self.sizes {
            out.write_u32::<LittleEndian>(*hash)?;
            out.write_u32::<LittleEndian>(*size)?;
        }
        Ok(out)
    }

    #[must_use]
    pub fn get(&self, canonical: &str) -> Option<u32> {
        self.sizes.get(&name_hash(canonical)).copied()
    }

    pub fn set(&mut self, canonical: &str, size: u32) {
        self.sizes.insert(name_hash(canonical), size);
    }

    /// Raise the entry for `canonical` to fit `len` decompressed bytes
    ///
    /// Existing entries are never lowered.
    pub fn update(&mut self, canonical: &str, len: usize) {
        let estimate = estimate(len);
        let size = self.get(canonical).map_or(estimate, |current| current.max(estimate));
        self.set(canonical, size);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Size reserved for a resource of `len` bytes
#[must_use]
pub fn estimate(len: usize) -> u32 {
    let aligned = (len as u32).saturating_add(31) & !31;
    aligned.saturating_add(RESOURCE_OVERHEAD)
}

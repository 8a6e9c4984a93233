//! Version-aware row index for keyed tables
//!
//! Maps (table hash, key hash) to the row position in the vanilla table of a
//! given game version. Indices are built offline with [`TableIndexBuilder`],
//! serialized, and loaded read-only at runtime.
//!
//! Layout (little-endian): `TKIX`, u32 version, u32 table count; per table a
//! u32 table hash and u32 version count; per version an i32 version, u32 row
//! count and `(u64 key hash, u32 position)` pairs. Then the row cache: u32
//! count of `(u32 table hash, u64 key hash, i32 version, u32 length, bytes)`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const MAGIC: [u8; 4] = *b"TKIX";
const VERSION: u32 = 1;

type VersionRows = BTreeMap<i32, HashMap<u64, u32>>;

/// Precompiled row index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableIndex {
    tables: HashMap<u32, VersionRows>,
    row_cache: HashMap<(u32, u64, i32), Vec<u8>>,
}

impl TableIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    #[must_use]
    pub fn contains_table(&self, table: u32) -> bool {
        self.tables.contains_key(&table)
    }

    /// Version window used for `version`: the nearest indexed version not
    /// above it, else the earliest one
    #[must_use]
    pub fn resolve_version(&self, table: u32, version: i32) -> Option<i32> {
        let versions = self.tables.get(&table)?;
        versions
            .range(..=version)
            .next_back()
            .or_else(|| versions.iter().next())
            .map(|(v, _)| *v)
    }

    /// Position of the row with `key` in the vanilla table for `version`
    #[must_use]
    pub fn lookup(&self, table: u32, key: u64, version: i32) -> Option<usize> {
        let window = self.resolve_version(table, version)?;
        self.tables
            .get(&table)?
            .get(&window)?
            .get(&key)
            .map(|position| *position as usize)
    }

    /// Encoded row pinned to exactly `version`, if cached
    #[must_use]
    pub fn cached_row(&self, table: u32, key: u64, version: i32) -> Option<&[u8]> {
        self.row_cache
            .get(&(table, key, version))
            .map(Vec::as_slice)
    }

    /// Parse a serialized index
    ///
    /// # Errors
    /// Returns an error on bad magic, an unsupported version or truncated data.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(|_| Error::UnexpectedEof)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic {
                format: "table index",
                expected: &MAGIC,
                found: magic.to_vec(),
            });
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion {
                format: "table index",
                version,
            });
        }

        let mut index = Self::new();
        let table_count = cursor.read_u32::<LittleEndian>()?;
        for _ in 0..table_count {
            let table = cursor.read_u32::<LittleEndian>()?;
            let version_count = cursor.read_u32::<LittleEndian>()?;
            let versions = index.tables.entry(table).or_default();
            for _ in 0..version_count {
                let version = cursor.read_i32::<LittleEndian>()?;
                let row_count = cursor.read_u32::<LittleEndian>()? as usize;
                let rows = versions.entry(version).or_default();
                rows.reserve(row_count.min(data.len() / 12));
                for _ in 0..row_count {
                    let key = cursor.read_u64::<LittleEndian>()?;
                    let position = cursor.read_u32::<LittleEndian>()?;
                    rows.insert(key, position);
                }
            }
        }

        let cache_count = cursor.read_u32::<LittleEndian>()?;
        for _ in 0..cache_count {
            let table = cursor.read_u32::<LittleEndian>()?;
            let key = cursor.read_u64::<LittleEndian>()?;
            let version = cursor.read_i32::<LittleEndian>()?;
            let len = cursor.read_u32::<LittleEndian>()? as usize;
            if len > data.len() - cursor.position() as usize {
                return Err(Error::UnexpectedEof);
            }
            let mut row = vec![0u8; len];
            cursor.read_exact(&mut row)?;
            index.row_cache.insert((table, key, version), row);
        }

        tracing::debug!(
            "Loaded table index: {} tables, {} cached rows",
            index.tables.len(),
            index.row_cache.len()
        );
        Ok(index)
    }

    /// Load a serialized index from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Serialize the index; output is deterministic
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.write_u32::<LittleEndian>(VERSION)?;

        let mut tables: Vec<_> = self.tables.iter().collect();
        tables.sort_unstable_by_key(|(table, _)| **table);
        out.write_u32::<LittleEndian>(tables.len() as u32)?;
        for (table, versions) in tables {
            out.write_u32::<LittleEndian>(*table)?;
            out.write_u32::<LittleEndian>(versions.len() as u32)?;
            for (version, rows) in versions {
                out.write_i32::<LittleEndian>(*version)?;
                let mut rows: Vec<_> = rows.iter().collect();
                rows.sort_unstable();
                out.write_u32::<LittleEndian>(rows.len() as u32)?;
                for (key, position) in rows {
                    out.write_u64::<LittleEndian>(*key)?;
                    out.write_u32::<LittleEndian>(*position)?;
                }
            }
        }

        let mut cache: Vec<_> = self.row_cache.iter().collect();
        cache.sort_unstable_by_key(|(key, _)| **key);
        out.write_u32::<LittleEndian>(cache.len() as u32)?;
        for ((table, key, version), row) in cache {
            out.write_u32::<LittleEndian>(*table)?;
            out.write_u64::<LittleEndian>(*key)?;
            out.write_i32::<LittleEndian>(*version)?;
            out.write_u32::<LittleEndian>(row.len() as u32)?;
            out.extend_from_slice(row);
        }
        Ok(out)
    }
}

/// Offline construction of a [`TableIndex`]
#[derive(Debug, Default)]
pub struct TableIndexBuilder {
    index: TableIndex,
}

impl TableIndexBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one table version; keys are given in row order.
    ///
    /// Duplicate keys keep their first position.
    pub fn add_table(&mut self, table: u32, version: i32, keys: impl IntoIterator<Item = u64>) {
        let rows = self
            .index
            .tables
            .entry(table)
            .or_default()
            .entry(version)
            .or_default();
        for (position, key) in keys.into_iter().enumerate() {
            rows.entry(key).or_insert(position as u32);
        }
    }

    /// Pin the encoded bytes of one row for an exact version
    pub fn cache_row(&mut self, table: u32, key: u64, version: i32, row: Vec<u8>) {
        self.index.row_cache.insert((table, key, version), row);
    }

    #[must_use]
    pub fn build(self) -> TableIndex {
        self.index
    }
}

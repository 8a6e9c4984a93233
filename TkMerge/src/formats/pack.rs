//! Pack archives (SARC)
//!
//! A pack is a flat archive of named byte blobs. Entries are kept sorted by
//! name, so serializing the same set of entries always produces the same bytes.
//!
//! Layout (little-endian): `SARC`, u16 version, u32 entry count, then per
//! entry a u16-length-prefixed UTF-8 name and a u32-length-prefixed blob.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const MAGIC: [u8; 4] = *b"SARC";
const VERSION: u16 = 1;

/// Marker content for an entry that a mod removed from its archive.
///
/// Written during build in place of the entry data and deleted from the
/// archive when the merged archive is written.
pub const REMOVED_ENTRY: &[u8] = b"TKSCRMVD";

/// An in-memory pack archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sarc {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Sarc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a pack archive
    ///
    /// # Errors
    /// Returns an error on bad magic, an unsupported version or truncated data.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(|_| Error::UnexpectedEof)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic {
                format: "SARC",
                expected: &MAGIC,
                found: magic.to_vec(),
            });
        }

        let version = cursor.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion {
                format: "SARC",
                version: u32::from(version),
            });
        }

        let count = cursor.read_u32::<LittleEndian>()? as usize;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let name_len = cursor.read_u16::<LittleEndian>()? as usize;
            let name = read_exact_vec(&mut cursor, name_len)?;
            let name = String::from_utf8(name)?;
            let data_len = cursor.read_u32::<LittleEndian>()? as usize;
            let data = read_exact_vec(&mut cursor, data_len)?;
            entries.insert(name, data);
        }

        Ok(Self { entries })
    }

    /// Serialize the archive
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload: usize = self
            .entries
            .iter()
            .map(|(name, data)| 6 + name.len() + data.len())
            .sum();
        let mut out = Vec::with_capacity(10 + payload);
        out.extend_from_slice(&MAGIC);
        out.write_u16::<LittleEndian>(VERSION)?;
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for (name, data) in &self.entries {
            let name_len = u16::try_from(name.len())
                .map_err(|_| Error::structure("SARC", format!("entry name too long: {name}")))?;
            let data_len = u32::try_from(data.len())
                .map_err(|_| Error::structure("SARC", format!("entry too large: {name}")))?;
            out.write_u16::<LittleEndian>(name_len)?;
            out.extend_from_slice(name.as_bytes());
            out.write_u32::<LittleEndian>(data_len)?;
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or overwrite an entry.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(name.into(), data);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.entries.remove(name)
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `data` looks like a pack archive
#[must_use]
pub fn is_sarc(data: &[u8]) -> bool {
    data.starts_with(&MAGIC)
}

fn read_exact_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(Error::UnexpectedEof);
    }
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

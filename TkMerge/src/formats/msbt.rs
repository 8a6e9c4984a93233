//! Message tables (MSBT)
//!
//! An ordered `label → text` table. Labels are UTF-8, text is stored as
//! UTF-16LE code units.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;

use crate::error::{Error, Result};

const MAGIC: [u8; 8] = *b"MsgStdBn";

/// An in-memory message table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Msbt {
    /// Entries in file order
    pub entries: IndexMap<String, String>,
}

impl Msbt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a message table
    ///
    /// # Errors
    /// Returns an error on bad magic, truncated data or invalid UTF-16 text.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 8];
        cursor
            .read_exact(&mut magic)
            .map_err(|_| Error::UnexpectedEof)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic {
                format: "MSBT",
                expected: &MAGIC,
                found: magic.to_vec(),
            });
        }

        let count = cursor.read_u32::<LittleEndian>()? as usize;
        let mut entries = IndexMap::with_capacity(count.min(data.len()));
        for _ in 0..count {
            let label_len = cursor.read_u16::<LittleEndian>()? as usize;
            let mut label = vec![0u8; label_len];
            cursor.read_exact(&mut label)?;
            let label = String::from_utf8(label)?;

            let units = cursor.read_u32::<LittleEndian>()? as usize;
            let remaining = data.len() - cursor.position() as usize;
            if units.saturating_mul(2) > remaining {
                return Err(Error::UnexpectedEof);
            }
            let mut text = Vec::with_capacity(units);
            for _ in 0..units {
                text.push(cursor.read_u16::<LittleEndian>()?);
            }
            let text = String::from_utf16(&text)
                .map_err(|e| Error::InvalidString(format!("{label}: {e}")))?;

            entries.insert(label, text);
        }

        Ok(Self { entries })
    }

    /// Serialize the table
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for (label, text) in &self.entries {
            let label_len = u16::try_from(label.len())
                .map_err(|_| Error::structure("MSBT", format!("label too long: {label}")))?;
            out.write_u16::<LittleEndian>(label_len)?;
            out.extend_from_slice(label.as_bytes());

            let units: Vec<u16> = text.encode_utf16().collect();
            out.write_u32::<LittleEndian>(units.len() as u32)?;
            for unit in units {
                out.write_u16::<LittleEndian>(unit)?;
            }
        }
        Ok(out)
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    /// Insert or overwrite an entry, keeping the position of existing labels.
    pub fn insert(&mut self, label: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(label.into(), text.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! BYML reading and parsing

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use indexmap::IndexMap;

use super::node::Byml;
use super::{
    KEY_SPEC_HASH, KEY_SPEC_NAMED, KEY_SPEC_POSITIONAL, MAGIC, MAX_DEPTH, NODE_ARRAY, NODE_BINARY,
    NODE_BOOL, NODE_CHANGELOG, NODE_DOUBLE, NODE_FLOAT, NODE_HASH_MAP32, NODE_HASH_MAP64,
    NODE_INT, NODE_INT64, NODE_MAP, NODE_NULL, NODE_REMOVE, NODE_STRING, NODE_UINT, NODE_UINT64,
    VERSION,
};
use crate::diff::{ArrayChange, ArrayChangelog, ArrayKeySpec, ChangeKind, KeyValue};
use crate::error::{Error, Result};

/// Read a BYML file from disk
///
/// # Errors
/// Returns an error if the file cannot be read or has an invalid format.
pub fn read_byml<P: AsRef<Path>>(path: P) -> Result<Byml> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    parse_byml_bytes(&buffer)
}

/// Parse BYML data from bytes
///
/// # Errors
/// Returns an error if the data has an invalid BYML format or nests deeper
/// than the reader allows.
pub fn parse_byml_bytes(data: &[u8]) -> Result<Byml> {
    let mut reader = BymlReader {
        cursor: Cursor::new(data),
    };

    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::InvalidMagic {
            format: "BYML",
            expected: &MAGIC,
            found: magic.to_vec(),
        });
    }

    let version = reader.u16()?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion {
            format: "BYML",
            version: u32::from(version),
        });
    }

    reader.node(0)
}

struct BymlReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl BymlReader<'_> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.cursor.read_exact(buf).map_err(eof)
    }

    fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(eof)
    }

    fn u16(&mut self) -> Result<u16> {
        self.cursor.read_u16::<LittleEndian>().map_err(eof)
    }

    fn u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<LittleEndian>().map_err(eof)
    }

    fn u64(&mut self) -> Result<u64> {
        self.cursor.read_u64::<LittleEndian>().map_err(eof)
    }

    /// Length prefix checked against the bytes left, so corrupt counts fail fast
    fn len(&mut self, min_item_size: usize) -> Result<usize> {
        let len = self.u32()? as usize;
        let remaining = self.cursor.get_ref().len() - self.cursor.position() as usize;
        if len.saturating_mul(min_item_size) > remaining {
            return Err(Error::UnexpectedEof);
        }
        Ok(len)
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.len(1)?;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn string(&mut self) -> Result<String> {
        Ok(String::from_utf8(self.bytes()?)?)
    }

    fn key_string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    fn node(&mut self, depth: usize) -> Result<Byml> {
        if depth > MAX_DEPTH {
            return Err(Error::structure(
                "BYML",
                format!("nesting deeper than {MAX_DEPTH}"),
            ));
        }

        let tag = self.u8()?;
        let node = match tag {
            NODE_NULL => Byml::Null,
            NODE_REMOVE => Byml::Remove,
            NODE_BOOL => Byml::Bool(self.u8()? != 0),
            NODE_INT => Byml::Int(self.cursor.read_i32::<LittleEndian>().map_err(eof)?),
            NODE_FLOAT => Byml::Float(self.cursor.read_f32::<LittleEndian>().map_err(eof)?),
            NODE_UINT => Byml::UInt(self.u32()?),
            NODE_INT64 => Byml::Int64(self.cursor.read_i64::<LittleEndian>().map_err(eof)?),
            NODE_UINT64 => Byml::UInt64(self.u64()?),
            NODE_DOUBLE => Byml::Double(self.cursor.read_f64::<LittleEndian>().map_err(eof)?),
            NODE_STRING => Byml::String(self.string()?),
            NODE_BINARY => Byml::Binary(self.bytes()?),
            NODE_ARRAY => {
                let count = self.len(1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.node(depth + 1)?);
                }
                Byml::Array(items)
            }
            NODE_MAP => {
                let count = self.len(3)?;
                let mut map = IndexMap::with_capacity(count);
                for _ in 0..count {
                    let key = self.key_string()?;
                    let value = self.node(depth + 1)?;
                    map.insert(key, value);
                }
                Byml::Map(map)
            }
            NODE_HASH_MAP32 => {
                let count = self.len(5)?;
                let mut map = IndexMap::with_capacity(count);
                for _ in 0..count {
                    let key = self.u32()?;
                    let value = self.node(depth + 1)?;
                    map.insert(key, value);
                }
                Byml::HashMap32(map)
            }
            NODE_HASH_MAP64 => {
                let count = self.len(9)?;
                let mut map = IndexMap::with_capacity(count);
                for _ in 0..count {
                    let key = self.u64()?;
                    let value = self.node(depth + 1)?;
                    map.insert(key, value);
                }
                Byml::HashMap64(map)
            }
            NODE_CHANGELOG => Byml::Changelog(Box::new(self.changelog(depth)?)),
            other => return Err(Error::InvalidNodeType(other)),
        };

        Ok(node)
    }

    fn changelog(&mut self, depth: usize) -> Result<ArrayChangelog> {
        let key = match self.u8()? {
            KEY_SPEC_POSITIONAL => ArrayKeySpec::Positional,
            KEY_SPEC_HASH => ArrayKeySpec::Hash {
                field: self.key_string()?,
            },
            KEY_SPEC_NAMED => {
                let primary = self.key_string()?;
                let secondary = if self.u8()? != 0 {
                    Some(self.key_string()?)
                } else {
                    None
                };
                ArrayKeySpec::Named { primary, secondary }
            }
            other => {
                return Err(Error::structure(
                    "array changelog",
                    format!("invalid key spec {other}"),
                ));
            }
        };

        let count = self.len(7)?;
        let mut changelog = ArrayChangelog::new(key);
        for _ in 0..count {
            let position = self.u32()? as usize;
            let kind = ChangeKind::from_u8(self.u8()?)?;
            let flags = self.u8()?;
            let primary_key = if flags & 1 != 0 {
                Some(self.key_value()?)
            } else {
                None
            };
            let secondary_key = if flags & 2 != 0 {
                Some(self.key_value()?)
            } else {
                None
            };
            let value = self.node(depth + 1)?;
            changelog.push(ArrayChange {
                position,
                kind,
                value,
                primary_key,
                secondary_key,
            });
        }

        changelog.validate()?;
        Ok(changelog)
    }

    fn key_value(&mut self) -> Result<KeyValue> {
        match self.u8()? {
            NODE_INT => Ok(KeyValue::I32(
                self.cursor.read_i32::<LittleEndian>().map_err(eof)?,
            )),
            NODE_UINT => Ok(KeyValue::U32(self.u32()?)),
            NODE_INT64 => Ok(KeyValue::I64(
                self.cursor.read_i64::<LittleEndian>().map_err(eof)?,
            )),
            NODE_UINT64 => Ok(KeyValue::U64(self.u64()?)),
            NODE_STRING => Ok(KeyValue::String(self.string()?)),
            other => Err(Error::InvalidNodeType(other)),
        }
    }
}

fn eof(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_magic() {
        let err = parse_byml_bytes(b"BY\x07\x00\xFF").unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));
    }

    #[test]
    fn test_rejects_unknown_node() {
        let err = parse_byml_bytes(b"YB\x07\x00\x42").unwrap_err();
        assert!(matches!(err, Error::InvalidNodeType(0x42)));
    }

    #[test]
    fn test_truncated_array() {
        // Array claiming 1000 children with no payload
        let err = parse_byml_bytes(b"YB\x07\x00\xC0\xE8\x03\x00\x00").unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }

    #[test]
    fn test_depth_limit() {
        let mut data = b"YB\x07\x00".to_vec();
        for _ in 0..=MAX_DEPTH + 1 {
            data.extend_from_slice(&[NODE_ARRAY, 1, 0, 0, 0]);
        }
        data.push(NODE_NULL);
        let err = parse_byml_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::UnexpectedStructure { .. }));
    }
}

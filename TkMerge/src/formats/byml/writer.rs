//! BYML writing and serialization
//!
//! Map keys are written sorted so identical trees always produce identical bytes.

use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::node::Byml;
use super::{
    KEY_SPEC_HASH, KEY_SPEC_NAMED, KEY_SPEC_POSITIONAL, MAGIC, NODE_INT, NODE_INT64, NODE_STRING,
    NODE_UINT, NODE_UINT64, VERSION,
};
use crate::diff::{ArrayChangelog, ArrayKeySpec, KeyValue};
use crate::error::{Error, Result};

/// Write a BYML tree to disk
pub fn write_byml<P: AsRef<Path>>(node: &Byml, path: P) -> Result<()> {
    let bytes = serialize_byml(node)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Serialize a BYML tree to bytes
///
/// # Errors
/// Returns an error if an embedded array changelog is inconsistent or a
/// string is too long for its length prefix.
pub fn serialize_byml(node: &Byml) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    output.extend_from_slice(&MAGIC);
    output.write_u16::<LittleEndian>(VERSION)?;
    write_node(&mut output, node)?;
    Ok(output)
}

fn write_node(out: &mut Vec<u8>, node: &Byml) -> Result<()> {
    out.write_u8(node.node_type())?;
    match node {
        Byml::Null | Byml::Remove => {}
        Byml::Bool(v) => out.write_u8(u8::from(*v))?,
        Byml::Int(v) => out.write_i32::<LittleEndian>(*v)?,
        Byml::Float(v) => out.write_f32::<LittleEndian>(*v)?,
        Byml::UInt(v) => out.write_u32::<LittleEndian>(*v)?,
        Byml::Int64(v) => out.write_i64::<LittleEndian>(*v)?,
        Byml::UInt64(v) => out.write_u64::<LittleEndian>(*v)?,
        Byml::Double(v) => out.write_f64::<LittleEndian>(*v)?,
        Byml::String(s) => write_bytes(out, s.as_bytes())?,
        Byml::Binary(data) => write_bytes(out, data)?,
        Byml::Array(items) => {
            write_len(out, items.len())?;
            for item in items {
                write_node(out, item)?;
            }
        }
        Byml::Map(map) => {
            write_len(out, map.len())?;
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                write_key_string(out, key)?;
                write_node(out, &map[key])?;
            }
        }
        Byml::HashMap32(map) => {
            write_len(out, map.len())?;
            let mut keys: Vec<u32> = map.keys().copied().collect();
            keys.sort_unstable();
            for key in keys {
                out.write_u32::<LittleEndian>(key)?;
                write_node(out, &map[&key])?;
            }
        }
        Byml::HashMap64(map) => {
            write_len(out, map.len())?;
            let mut keys: Vec<u64> = map.keys().copied().collect();
            keys.sort_unstable();
            for key in keys {
                out.write_u64::<LittleEndian>(key)?;
                write_node(out, &map[&key])?;
            }
        }
        Byml::Changelog(changelog) => write_changelog(out, changelog)?,
    }
    Ok(())
}

fn write_changelog(out: &mut Vec<u8>, changelog: &ArrayChangelog) -> Result<()> {
    changelog.validate()?;

    match &changelog.key {
        ArrayKeySpec::Positional => out.write_u8(KEY_SPEC_POSITIONAL)?,
        ArrayKeySpec::Hash { field } => {
            out.write_u8(KEY_SPEC_HASH)?;
            write_key_string(out, field)?;
        }
        ArrayKeySpec::Named { primary, secondary } => {
            out.write_u8(KEY_SPEC_NAMED)?;
            write_key_string(out, primary)?;
            match secondary {
                Some(name) => {
                    out.write_u8(1)?;
                    write_key_string(out, name)?;
                }
                None => out.write_u8(0)?,
            }
        }
    }

    write_len(out, changelog.changes.len())?;
    for change in &changelog.changes {
        let position = u32::try_from(change.position)
            .map_err(|_| Error::structure("array changelog", "position exceeds u32"))?;
        out.write_u32::<LittleEndian>(position)?;
        out.write_u8(change.kind as u8)?;
        let flags = u8::from(change.primary_key.is_some())
            | (u8::from(change.secondary_key.is_some()) << 1);
        out.write_u8(flags)?;
        if let Some(key) = &change.primary_key {
            write_key_value(out, key)?;
        }
        if let Some(key) = &change.secondary_key {
            write_key_value(out, key)?;
        }
        write_node(out, &change.value)?;
    }
    Ok(())
}

fn write_key_value(out: &mut Vec<u8>, key: &KeyValue) -> Result<()> {
    match key {
        KeyValue::I32(v) => {
            out.write_u8(NODE_INT)?;
            out.write_i32::<LittleEndian>(*v)?;
        }
        KeyValue::U32(v) => {
            out.write_u8(NODE_UINT)?;
            out.write_u32::<LittleEndian>(*v)?;
        }
        KeyValue::I64(v) => {
            out.write_u8(NODE_INT64)?;
            out.write_i64::<LittleEndian>(*v)?;
        }
        KeyValue::U64(v) => {
            out.write_u8(NODE_UINT64)?;
            out.write_u64::<LittleEndian>(*v)?;
        }
        KeyValue::String(s) => {
            out.write_u8(NODE_STRING)?;
            write_bytes(out, s.as_bytes())?;
        }
    }
    Ok(())
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::structure("BYML", "length exceeds u32"))?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    write_len(out, data.len())?;
    out.extend_from_slice(data);
    Ok(())
}

fn write_key_string(out: &mut Vec<u8>, key: &str) -> Result<()> {
    let len = u16::try_from(key.len())
        .map_err(|_| Error::structure("BYML", format!("map key too long: {} bytes", key.len())))?;
    out.write_u16::<LittleEndian>(len)?;
    out.extend_from_slice(key.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ArrayChange;
    use crate::formats::byml::parse_byml_bytes;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_with_changelog() {
        let mut changelog = ArrayChangelog::new(ArrayKeySpec::Named {
            primary: "Name".into(),
            secondary: Some("Index".into()),
        });
        changelog.push(
            ArrayChange::edit(1, Byml::map([("Value", Byml::Float(2.5))]))
                .keyed((KeyValue::String("Foo".into()), Some(KeyValue::I32(3)))),
        );
        changelog.push(ArrayChange::add(4, Byml::from("bar")));

        let mut hashes = IndexMap::new();
        hashes.insert(0xDEAD_BEEF_u32, Byml::Bool(true));

        let tree = Byml::map([
            ("List", Byml::Changelog(Box::new(changelog))),
            ("Gone", Byml::Remove),
            ("Hashes", Byml::HashMap32(hashes)),
            ("Blob", Byml::Binary(vec![1, 2, 3])),
            ("Big", Byml::UInt64(u64::MAX)),
        ]);

        let bytes = serialize_byml(&tree).unwrap();
        assert_eq!(parse_byml_bytes(&bytes).unwrap(), tree);
    }

    #[test]
    fn test_key_order_is_deterministic() {
        let a = Byml::map([("B", Byml::Int(1)), ("A", Byml::Int(2))]);
        let b = Byml::map([("A", Byml::Int(2)), ("B", Byml::Int(1))]);
        assert_eq!(serialize_byml(&a).unwrap(), serialize_byml(&b).unwrap());
    }

    #[test]
    fn test_rejects_mixed_changelog() {
        let mut changelog = ArrayChangelog::new(ArrayKeySpec::Positional);
        changelog.push(ArrayChange::remove(0).keyed((KeyValue::U32(1), None)));
        let tree = Byml::Changelog(Box::new(changelog));
        assert!(matches!(
            serialize_byml(&tree),
            Err(Error::MixedArrayChangelog)
        ));
    }
}

//! `TKCL` serialization
//!
//! Layout (little-endian): `TKCL`, u32 format version, u32 builder version,
//! u32 game version, u32 entry count; per entry the canonical, u8 type, u8
//! attributes, u32 dictionary id, a u32-counted list of i32 versions and a
//! u32-counted list of parent canonicals. Six u32-counted string lists follow:
//! localization, patches, cheats, loader, exe, reserved. Strings are
//! u16-length-prefixed UTF-8.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::canonical::FileAttributes;
use crate::error::{Error, Result};

use super::{Changelog, ChangelogEntry, EntryType};

const MAGIC: [u8; 4] = *b"TKCL";
const FORMAT_VERSION: u32 = 1;

pub(super) fn write(changelog: &Changelog) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    out.write_u32::<LittleEndian>(changelog.builder_version)?;
    out.write_u32::<LittleEndian>(changelog.game_version)?;

    write_count(&mut out, changelog.entries.len())?;
    for entry in changelog.entries.values() {
        write_string(&mut out, &entry.canonical)?;
        out.write_u8(entry.kind as u8)?;
        out.write_u8(entry.attributes.bits())?;
        out.write_u32::<LittleEndian>(entry.zs_dictionary_id)?;
        write_count(&mut out, entry.versions.len())?;
        for version in &entry.versions {
            out.write_i32::<LittleEndian>(*version)?;
        }
        write_strings(&mut out, entry.parents.iter())?;
    }

    for list in [
        &changelog.mals,
        &changelog.patches,
        &changelog.cheats,
        &changelog.loader,
        &changelog.exe,
        &changelog.reserved,
    ] {
        write_strings(&mut out, list.iter())?;
    }
    Ok(out)
}

pub(super) fn read(data: &[u8]) -> Result<Changelog> {
    let mut cursor = Cursor::new(data);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(|_| Error::UnexpectedEof)?;
    if magic != MAGIC {
        return Err(Error::InvalidMagic {
            format: "changelog",
            expected: &MAGIC,
            found: magic.to_vec(),
        });
    }
    let version = read_u32(&mut cursor)?;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            format: "changelog",
            version,
        });
    }

    let builder_version = read_u32(&mut cursor)?;
    let mut changelog = Changelog::new(read_u32(&mut cursor)?);
    changelog.builder_version = builder_version;

    let count = read_u32(&mut cursor)?;
    for _ in 0..count {
        let canonical = read_string(&mut cursor)?;
        let kind = EntryType::from_u8(cursor.read_u8().map_err(|_| Error::UnexpectedEof)?)?;
        let attributes = FileAttributes::from_bits_truncate(
            cursor.read_u8().map_err(|_| Error::UnexpectedEof)?,
        );
        let mut entry = ChangelogEntry::new(canonical, kind, attributes)
            .with_dictionary(read_u32(&mut cursor)?);
        for _ in 0..read_u32(&mut cursor)? {
            entry.versions.insert(
                cursor
                    .read_i32::<LittleEndian>()
                    .map_err(|_| Error::UnexpectedEof)?,
            );
        }
        entry.parents = read_strings(&mut cursor)?.into_iter().collect();
        changelog.upsert(entry);
    }

    changelog.mals = read_strings(&mut cursor)?;
    changelog.patches = read_strings(&mut cursor)?;
    changelog.cheats = read_strings(&mut cursor)?;
    changelog.loader = read_strings(&mut cursor)?;
    changelog.exe = read_strings(&mut cursor)?;
    changelog.reserved = read_strings(&mut cursor)?;
    Ok(changelog)
}

fn write_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| Error::structure("changelog", "too many items"))?;
    out.write_u32::<LittleEndian>(count)?;
    Ok(())
}

fn write_string(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| Error::structure("changelog", format!("string too long: {value}")))?;
    out.write_u16::<LittleEndian>(len)?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_strings<'a>(
    out: &mut Vec<u8>,
    values: impl ExactSizeIterator<Item = &'a String>,
) -> Result<()> {
    write_count(out, values.len())?;
    for value in values {
        write_string(out, value)?;
    }
    Ok(())
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::UnexpectedEof)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| Error::UnexpectedEof)? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(|_| Error::UnexpectedEof)?;
    Ok(String::from_utf8(bytes)?)
}

fn read_strings(cursor: &mut Cursor<&[u8]>) -> Result<Vec<String>> {
    let count = read_u32(cursor)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if count > remaining / 2 {
        return Err(Error::UnexpectedEof);
    }
    (0..count).map(|_| read_string(cursor)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Changelog {
        let mut changelog = Changelog::new(121);
        changelog.upsert(
            ChangelogEntry::new(
                "RSDB/ActorInfo.Product.rstbl.byml",
                EntryType::Changelog,
                FileAttributes::ZS_COMPRESSED | FileAttributes::PRODUCT_FILE,
            )
            .with_version(110)
            .with_version(121)
            .with_dictionary(3),
        );
        changelog.upsert(
            ChangelogEntry::new("Actor/Foo.bgyml", EntryType::Copy, FileAttributes::empty())
                .with_version(-1)
                .with_parent("Pack/Actor/Foo.pack"),
        );
        changelog.mals.push("romfs/Mals/USen.Product.sarc.zs".to_string());
        changelog.patches.push("exefs/main.ips".to_string());
        changelog
    }

    #[test]
    fn test_wire_round_trip() {
        let changelog = sample();
        let bytes = changelog.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"TKCL");
        assert_eq!(Changelog::from_bytes(&bytes).unwrap(), changelog);
    }

    #[test]
    fn test_rejects_truncated_and_foreign_data() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            Changelog::from_bytes(&bytes[..bytes.len() - 3]),
            Err(Error::UnexpectedEof)
        ));
        assert!(matches!(
            Changelog::from_bytes(b"SARC\x01\x00"),
            Err(Error::InvalidMagic { .. })
        ));
    }
}

//! End-to-end build and merge tests

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tkmerge::changelog::CHANGELOG_FILE;
use tkmerge::prelude::*;

fn row(hash: u32, fields: &[(&str, i32)]) -> Byml {
    let mut map = IndexMap::new();
    map.insert("Hash".to_string(), Byml::UInt(hash));
    for (name, value) in fields {
        map.insert((*name).to_string(), Byml::Int(*value));
    }
    Byml::Map(map)
}

fn rows(rows: Vec<Byml>) -> Vec<u8> {
    Byml::map([("Rows", Byml::Array(rows))]).to_bytes().unwrap()
}

fn actor(life: i32, speed: i32) -> Vec<u8> {
    Byml::map([("Life", Byml::Int(life)), ("Speed", Byml::Int(speed))])
        .to_bytes()
        .unwrap()
}

fn pack(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut pack = Sarc::new();
    for (name, data) in entries {
        pack.insert(*name, data.clone());
    }
    pack.to_bytes().unwrap()
}

fn registry() -> HandlerRegistry {
    HandlerRegistry::from_config(&TkConfig::default())
}

/// Build a mod from `(romfs-relative path, content)` pairs
fn build(rom: &MemoryRom, files: &[(&str, Vec<u8>)]) -> MemorySource {
    let mut source = MemorySource::new();
    for (path, data) in files {
        source.insert(&format!("romfs/{path}"), data.clone());
    }
    let writer = MemoryWriter::new();
    let report = Builder::new(rom, &registry()).build(&source, &writer).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    writer.into_source()
}

/// Merge built mods, highest priority first
fn merge(rom: &MemoryRom, mods: &[&MemorySource]) -> MemoryWriter {
    let mods: Vec<&dyn ModSource> = mods.iter().map(|m| *m as &dyn ModSource).collect();
    let writer = MemoryWriter::new();
    let report = Merger::new(rom, &registry()).merge(&mods, &writer).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    writer
}

fn merged_tree(writer: &MemoryWriter, path: &str) -> Byml {
    Byml::from_bytes(&writer.get(&format!("romfs/{path}")).unwrap()).unwrap()
}

#[test]
fn test_single_mod_round_trip() {
    let vanilla = rows(vec![row(1, &[("A", 1)]), row(2, &[("A", 2)])]);
    let modded = rows(vec![row(2, &[("A", 20)]), row(1, &[("A", 1)]), row(4, &[("A", 4)])]);
    let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, vanilla);

    let built = build(&rom, &[("Actor/Foo.byml", modded)]);
    let merged = merge(&rom, &[&built]);

    assert_eq!(
        merged_tree(&merged, "Actor/Foo.byml"),
        Byml::from_bytes(&rows(vec![row(1, &[("A", 1)]), row(2, &[("A", 20)]), row(4, &[("A", 4)])]))
            .unwrap()
    );
}

#[test]
fn test_merging_twice_is_stable() {
    let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, actor(10, 1));
    let built = build(&rom, &[("Actor/Foo.byml", actor(40, 1))]);

    let first = merge(&rom, &[&built]);
    let second = merge(&rom, &[&built]);
    assert_eq!(first.paths(), second.paths());
    for path in first.paths() {
        assert_eq!(first.get(&path), second.get(&path), "{path}");
    }
}

#[test]
fn test_higher_priority_wins_scalar_conflict() {
    let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, actor(10, 1));
    let low = build(&rom, &[("Actor/Foo.byml", actor(20, 1))]);
    let high = build(&rom, &[("Actor/Foo.byml", actor(30, 1))]);

    let merged = merge(&rom, &[&high, &low]);
    assert_eq!(merged_tree(&merged, "Actor/Foo.byml").get("Life"), Some(&Byml::Int(30)));

    let merged = merge(&rom, &[&low, &high]);
    assert_eq!(merged_tree(&merged, "Actor/Foo.byml").get("Life"), Some(&Byml::Int(20)));
}

#[test]
fn test_keyed_additions_from_two_mods() {
    let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, rows(vec![row(1, &[])]));
    let a = build(&rom, &[("Actor/Foo.byml", rows(vec![row(1, &[]), row(2, &[])]))]);
    let b = build(&rom, &[("Actor/Foo.byml", rows(vec![row(1, &[]), row(3, &[])]))]);

    let merged = merge(&rom, &[&b, &a]);
    assert_eq!(
        merged_tree(&merged, "Actor/Foo.byml").get("Rows"),
        Some(&Byml::Array(vec![row(1, &[]), row(2, &[]), row(3, &[])]))
    );
}

#[test]
fn test_keyed_field_edits_both_survive() {
    let rom = MemoryRom::new(121)
        .with_file("Actor/Foo.byml", -1, rows(vec![row(1, &[("X", 0), ("Y", 0)])]));
    let a = build(&rom, &[("Actor/Foo.byml", rows(vec![row(1, &[("X", 1), ("Y", 0)])]))]);
    let b = build(&rom, &[("Actor/Foo.byml", rows(vec![row(1, &[("X", 0), ("Y", 2)])]))]);

    let merged = merge(&rom, &[&b, &a]);
    assert_eq!(
        merged_tree(&merged, "Actor/Foo.byml").get("Rows"),
        Some(&Byml::Array(vec![row(1, &[("X", 1), ("Y", 2)])]))
    );
}

#[test]
fn test_archive_entries() {
    let vanilla = pack(&[
        ("Actor/Foo.byml", actor(10, 1)),
        ("Actor/Same.byml", actor(5, 5)),
        ("Actor/Gone.byml", actor(0, 0)),
    ]);
    let modded = pack(&[
        ("Actor/Foo.byml", actor(40, 1)),
        ("Actor/Same.byml", actor(5, 5)),
        ("Custom/Readme.txt", b"hello".to_vec()),
    ]);
    let rom = MemoryRom::new(121).with_file("Pack/Actor/Foo.pack", -1, vanilla);

    let built = build(&rom, &[("Pack/Actor/Foo.pack", modded)]);
    let changelog = Changelog::from_bytes(&built.read(CHANGELOG_FILE).unwrap()).unwrap();
    assert_eq!(changelog.get("Pack/Actor/Foo.pack").unwrap().kind, EntryType::Placeholder);
    assert_eq!(changelog.get("Actor/Foo.byml").unwrap().kind, EntryType::Changelog);
    assert_eq!(changelog.get("Custom/Readme.txt").unwrap().kind, EntryType::Copy);
    assert!(changelog.get("Actor/Same.byml").is_none());

    let merged = merge(&rom, &[&built]);
    let output = Sarc::from_bytes(&merged.get("romfs/Pack/Actor/Foo.pack").unwrap()).unwrap();
    assert_eq!(
        Byml::from_bytes(output.get("Actor/Foo.byml").unwrap()).unwrap(),
        Byml::from_bytes(&actor(40, 1)).unwrap()
    );
    assert_eq!(output.get("Actor/Same.byml"), Some(actor(5, 5).as_slice()));
    assert_eq!(output.get("Custom/Readme.txt"), Some(&b"hello"[..]));
    assert!(!output.contains("Actor/Gone.byml"));
}

#[test]
fn test_reorder_only_records_nothing() {
    let names = |names: &[&str]| {
        Byml::map([("Names", Byml::Array(names.iter().map(|n| Byml::from(*n)).collect()))])
            .to_bytes()
            .unwrap()
    };
    let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, names(&["a", "b", "c"]));
    let built = build(&rom, &[("Actor/Foo.byml", names(&["c", "a", "b"]))]);

    let changelog = Changelog::from_bytes(&built.read(CHANGELOG_FILE).unwrap()).unwrap();
    assert!(changelog.is_empty());
}

#[test]
fn test_folder_build_and_merge() {
    let mod_dir = tempdir().unwrap();
    let built_dir = tempdir().unwrap();
    let out_dir = tempdir().unwrap();
    std::fs::create_dir_all(mod_dir.path().join("romfs/Actor")).unwrap();
    std::fs::write(mod_dir.path().join("romfs/Actor/Foo.byml"), actor(40, 1)).unwrap();

    let rom = MemoryRom::new(121).with_file("Actor/Foo.byml", -1, actor(10, 1));
    let registry = registry();
    Builder::new(&rom, &registry)
        .build(&FolderSource::new(mod_dir.path()), &FolderWriter::new(built_dir.path()))
        .unwrap();
    assert!(built_dir.path().join(CHANGELOG_FILE).exists());

    let built = FolderSource::new(built_dir.path());
    Merger::new(&rom, &registry)
        .merge(&[&built], &FolderWriter::new(out_dir.path()))
        .unwrap();
    let merged = std::fs::read(out_dir.path().join("romfs/Actor/Foo.byml")).unwrap();
    assert_eq!(Byml::from_bytes(&merged).unwrap(), Byml::from_bytes(&actor(40, 1)).unwrap());
}

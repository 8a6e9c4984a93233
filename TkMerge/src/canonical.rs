//! Canonical asset paths
//!
//! A mod ships files like `romfs/RSDB/Tag.Product.110.rstbl.byml.zs`. The
//! engine identifies them by their canonical form (`RSDB/Tag.Product.rstbl.byml`),
//! which is the same across game versions and compression states. The
//! stripped information is kept in [`TkPath`] so the physical name can be
//! rebuilt on output.

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

bitflags! {
    /// Attributes stripped from a physical file name during canonicalization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u8 {
        /// The file carries a `.zs` suffix (zstd, optionally with a dictionary).
        const ZS_COMPRESSED = 1 << 0;
        /// The file carries a `.mc` suffix (multi-component compression).
        const MC_COMPRESSED = 1 << 1;
        /// The file name has a `Product.<version>` infix.
        const PRODUCT_FILE = 1 << 2;
    }
}

const ZS_SUFFIX: &str = ".zs";
const MC_SUFFIX: &str = ".mc";
const PRODUCT_INFIX: &str = ".Product";

/// Virtual root a mod file lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModRoot {
    /// Game content (`romfs/`)
    Romfs,
    /// Executable patches and loaders (`exefs/`)
    Exefs,
    /// Cheat tables (`cheats/`)
    Cheats,
    /// Anything else shipped by the mod (ignored by the engine)
    Other,
}

impl ModRoot {
    /// Parse the first path segment of a mod-relative path.
    #[must_use]
    pub fn from_segment(segment: &str) -> Self {
        if segment.eq_ignore_ascii_case("romfs") {
            Self::Romfs
        } else if segment.eq_ignore_ascii_case("exefs") {
            Self::Exefs
        } else if segment.eq_ignore_ascii_case("cheats") {
            Self::Cheats
        } else {
            Self::Other
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Romfs => "romfs",
            Self::Exefs => "exefs",
            Self::Cheats => "cheats",
            Self::Other => "extras",
        }
    }
}

/// A canonicalized asset path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TkPath {
    /// Root the file was found under
    pub root: ModRoot,
    /// Canonical name (version and compression suffix stripped)
    pub canonical: String,
    /// File-format version from a `Product.<version>` infix, or `-1`
    pub version: i32,
    /// Stripped attributes
    pub attributes: FileAttributes,
}

impl TkPath {
    /// Canonicalize a path relative to `root`.
    ///
    /// The input is never modified; all work happens on a private copy.
    #[must_use]
    pub fn new(path: &str, root: ModRoot) -> Self {
        let mut name = normalize(path);
        let mut attributes = FileAttributes::empty();

        if let Some(stripped) = strip_suffix_ignore_case(&name, ZS_SUFFIX) {
            name.truncate(stripped);
            attributes |= FileAttributes::ZS_COMPRESSED;
        } else if let Some(stripped) = strip_suffix_ignore_case(&name, MC_SUFFIX) {
            name.truncate(stripped);
            attributes |= FileAttributes::MC_COMPRESSED;
        }

        let mut version = -1;
        if let Some((canonical, parsed)) = strip_product_version(&name) {
            name = canonical;
            version = parsed;
            attributes |= FileAttributes::PRODUCT_FILE;
        }

        Self {
            root,
            canonical: name,
            version,
            attributes,
        }
    }

    /// Canonicalize a mod-relative path whose first segment is the root.
    ///
    /// Returns `None` for paths without a root segment.
    #[must_use]
    pub fn from_mod_path(path: &str) -> Option<Self> {
        let normalized = normalize(path);
        let (root, rest) = normalized.split_once('/')?;
        if rest.is_empty() {
            return None;
        }
        Some(Self::new(rest, ModRoot::from_segment(root)))
    }

    /// A path for an entry nested inside an archive (always `romfs`).
    #[must_use]
    pub fn nested(name: &str) -> Self {
        Self::new(name, ModRoot::Romfs)
    }

    /// Lowercased final extension of the canonical name, without the dot.
    #[must_use]
    pub fn extension(&self) -> String {
        extension_of(&self.canonical)
    }

    /// Whether the physical file is zstd compressed.
    #[must_use]
    pub fn is_zs_compressed(&self) -> bool {
        self.attributes.contains(FileAttributes::ZS_COMPRESSED)
    }

    /// Rebuild the physical file name for `version`, reapplying every stripped attribute.
    #[must_use]
    pub fn physical_name(&self, version: i32) -> String {
        physical_name(&self.canonical, self.attributes, version)
    }
}

impl fmt::Display for TkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.root.as_str(), self.canonical)?;
        if self.version >= 0 {
            write!(f, " (v{})", self.version)?;
        }
        Ok(())
    }
}

/// Rebuild a physical file name from its canonical parts.
#[must_use]
pub fn physical_name(canonical: &str, attributes: FileAttributes, version: i32) -> String {
    let mut name = canonical.to_string();
    if attributes.contains(FileAttributes::PRODUCT_FILE) && version >= 0 {
        if let Some(idx) = find_product_infix(&name) {
            name.insert_str(idx + PRODUCT_INFIX.len(), &format!(".{version}"));
        }
    }
    if attributes.contains(FileAttributes::ZS_COMPRESSED) {
        name.push_str(ZS_SUFFIX);
    } else if attributes.contains(FileAttributes::MC_COMPRESSED) {
        name.push_str(MC_SUFFIX);
    }
    name
}

/// Lowercased final extension of `name`, without the dot.
#[must_use]
pub fn extension_of(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Path of `path` below the mod root `root`, with forward slashes
#[must_use]
pub fn mod_relative(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(normalize(&relative.to_string_lossy()))
}

fn strip_suffix_ignore_case(name: &str, suffix: &str) -> Option<usize> {
    let split = name.len().checked_sub(suffix.len())?;
    (name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(suffix)).then_some(split)
}

/// Byte index of a `.Product` infix followed by `.` or the end of the name.
fn find_product_infix(name: &str) -> Option<usize> {
    name.match_indices(PRODUCT_INFIX).map(|(idx, _)| idx).find(|&idx| {
        let rest = &name[idx + PRODUCT_INFIX.len()..];
        rest.is_empty() || rest.starts_with('.')
    })
}

/// Strip the digits of a `.Product.<digits>` infix, returning the new name and the version.
fn strip_product_version(name: &str) -> Option<(String, i32)> {
    for (idx, _) in name.match_indices(PRODUCT_INFIX) {
        let digits_start = idx + PRODUCT_INFIX.len() + 1;
        if name.as_bytes().get(digits_start - 1) != Some(&b'.') {
            continue;
        }
        let digits_len = name[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits_len == 0 {
            continue;
        }
        let digits_end = digits_start + digits_len;
        let rest = &name[digits_end..];
        if !rest.is_empty() && !rest.starts_with('.') {
            continue;
        }
        let version = name[digits_start..digits_end].parse().ok()?;
        let mut canonical = String::with_capacity(name.len());
        canonical.push_str(&name[..digits_start - 1]);
        canonical.push_str(rest);
        return Some((canonical, version));
    }
    None
}

//! Mod file access
//!
//! [`ModSource`] enumerates and reads the files of a mod; [`ModWriter`]
//! receives build or merge output. Both use `/`-separated relative paths.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::canonical::mod_relative;
use crate::error::{Error, Result};

/// Read access to a mod's files
pub trait ModSource: Send + Sync {
    /// Every file, as sorted relative paths
    fn files(&self) -> Result<Vec<String>>;

    /// Content of one file
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Content of one file, or `None` when it does not exist
    fn try_read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.read(path) {
            Ok(data) => Ok(Some(data)),
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(Error::MissingContent(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Write access for build or merge output
pub trait ModWriter: Send + Sync {
    /// Create or overwrite one file
    ///
    /// # Errors
    /// Failures are reported as [`Error::Output`] and abort the run.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// A mod unpacked in a directory
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ModSource for FolderSource {
    fn files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(relative) = mod_relative(entry.path(), self.root.as_path()) {
                files.push(relative);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(path))?)
    }
}

/// Mod files held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.replace('\\', "/"), data);
    }
}

impl ModSource for MemorySource {
    fn files(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::MissingContent(path.to_string()))
    }
}

/// Writes output below a directory, creating parents as needed
#[derive(Debug, Clone)]
pub struct FolderWriter {
    root: PathBuf,
}

impl FolderWriter {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModWriter for FolderWriter {
    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.root.join(path);
        let result = match target.parent() {
            Some(parent) => fs::create_dir_all(parent).and_then(|()| fs::write(&target, data)),
            None => fs::write(&target, data),
        };
        result.map_err(|source| Error::Output {
            path: path.to_string(),
            source,
        })
    }
}

/// Collects output in memory
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// Written paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    /// Reuse the output as a source, e.g. to merge a freshly built mod
    #[must_use]
    pub fn into_source(self) -> MemorySource {
        MemorySource {
            files: self.files.into_inner(),
        }
    }
}

impl ModWriter for MemoryWriter {
    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.files.lock().insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_folder_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FolderWriter::new(dir.path());
        writer.write("romfs/Actor/Foo.byml", b"foo").unwrap();
        writer.write("exefs/main.ips", b"ips").unwrap();

        let source = FolderSource::new(dir.path());
        assert_eq!(
            source.files().unwrap(),
            vec!["exefs/main.ips".to_string(), "romfs/Actor/Foo.byml".to_string()]
        );
        assert_eq!(source.read("romfs/Actor/Foo.byml").unwrap(), b"foo");
        assert_eq!(source.try_read("romfs/missing").unwrap(), None);
    }

    #[test]
    fn test_memory_writer_into_source() {
        let writer = MemoryWriter::new();
        writer.write("changelog.tkcl", b"TKCL").unwrap();
        let source = writer.into_source();
        assert_eq!(source.files().unwrap(), vec!["changelog.tkcl".to_string()]);
        assert!(matches!(source.read("other"), Err(Error::MissingContent(_))));
    }
}

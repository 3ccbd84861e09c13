//! Release archive access.
//!
//! A release is read through [`ReleaseArchive`], which lists entries and
//! opens them as buffered readers. Zip files and unpacked directories are
//! supported. Entries may be opened any number of times; the importer
//! re-scans description files once per batch.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};

/// A source of RF2 files.
pub trait ReleaseArchive {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Every file entry, as `/`-separated relative paths.
    fn entries(&mut self) -> IndexResult<Vec<String>>;

    /// Opens an entry for reading.
    fn open(&mut self, entry: &str) -> IndexResult<Box<dyn BufRead + '_>>;
}

// =============================================================================
// Zip
// =============================================================================

/// A zipped release, as distributed.
pub struct ZipRelease<R: Read + Seek> {
    name: String,
    archive: zip::ZipArchive<R>,
}

impl ZipRelease<File> {
    /// Opens a zip file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
        Self::new(path.display().to_string(), file)
    }
}

impl<R: Read + Seek> ZipRelease<R> {
    /// Reads the central directory of a zip stream.
    pub fn new(name: impl Into<String>, reader: R) -> IndexResult<Self> {
        let name = name.into();
        let archive = zip::ZipArchive::new(reader).map_err(|e| IndexError::archive(&name, e))?;
        Ok(Self { name, archive })
    }
}

impl<R: Read + Seek> ReleaseArchive for ZipRelease<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&mut self) -> IndexResult<Vec<String>> {
        Ok(self
            .archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect())
    }

    fn open(&mut self, entry: &str) -> IndexResult<Box<dyn BufRead + '_>> {
        let file = self
            .archive
            .by_name(entry)
            .map_err(|e| IndexError::archive(&self.name, format!("{}: {}", entry, e)))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

// =============================================================================
// Directory
// =============================================================================

/// An unpacked release directory.
#[derive(Debug, Clone)]
pub struct DirectoryRelease {
    name: String,
    root: PathBuf,
}

impl DirectoryRelease {
    /// Uses `root` as the release root.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            name: root.display().to_string(),
            root,
        }
    }
}

impl ReleaseArchive for DirectoryRelease {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&mut self) -> IndexResult<Vec<String>> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let listing = std::fs::read_dir(&dir).map_err(|e| IndexError::io(&dir, e))?;
            for item in listing {
                let item = item.map_err(|e| IndexError::io(&dir, e))?;
                let path = item.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let parts: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    entries.push(parts.join("/"));
                }
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn open(&mut self, entry: &str) -> IndexResult<Box<dyn BufRead + '_>> {
        let path = self.root.join(entry);
        let file = File::open(&path).map_err(|e| IndexError::io(&path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

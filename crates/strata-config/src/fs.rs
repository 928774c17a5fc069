//! Filesystem and embedded-asset capabilities used by the loader.
//!
//! The loader never touches `std::fs` directly. File sources go through a
//! [`FileSystem`], embedded sources through [`EmbeddedFiles`], so tests can
//! run entirely in memory with [`MemFs`] and [`StaticFiles`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Read access to configuration files.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Whether `path` exists. A failed stat counts as absent.
    fn exists(&self, path: &Path) -> bool;

    /// Read the full contents of `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Whether change notifications can be delivered for paths on this filesystem.
    fn supports_watch(&self) -> bool {
        false
    }
}

/// The operating system's filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl FileSystem for OsFs {
    fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn supports_watch(&self) -> bool {
        true
    }
}

/// In-memory filesystem.
///
/// Paths are compared exactly as given; no normalisation is applied.
#[derive(Debug, Default)]
pub struct MemFs {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemFs {
    /// Create an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file.
    pub fn write(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), contents.into());
    }

    /// Remove a file, returning whether it existed.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.files.write().remove(path.as_ref()).is_some()
    }
}

impl FileSystem for MemFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file does not exist: {}", path.display()),
            )
        })
    }
}

/// Read access to assets compiled into the binary.
pub trait EmbeddedFiles {
    /// Read the named asset.
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// A static table of named assets, typically built from `include_bytes!`.
///
/// ```
/// use strata_config::{EmbeddedFiles, StaticFiles};
///
/// static DEFAULTS: StaticFiles = StaticFiles::new(&[
///     ("defaults.yaml", b"server:\n  port: 8080\n"),
/// ]);
///
/// assert!(DEFAULTS.read_file("defaults.yaml").is_ok());
/// assert!(DEFAULTS.read_file("missing.yaml").is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StaticFiles {
    entries: &'static [(&'static str, &'static [u8])],
}

impl StaticFiles {
    /// Wrap a static table of `(name, contents)` pairs.
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }
}

impl EmbeddedFiles for StaticFiles {
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, contents)| contents.to_vec())
            .ok_or_else(|| not_embedded(name))
    }
}

impl EmbeddedFiles for HashMap<String, Vec<u8>> {
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.get(name).cloned().ok_or_else(|| not_embedded(name))
    }
}

impl EmbeddedFiles for BTreeMap<String, Vec<u8>> {
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.get(name).cloned().ok_or_else(|| not_embedded(name))
    }
}

fn not_embedded(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no embedded file named {name}"),
    )
}

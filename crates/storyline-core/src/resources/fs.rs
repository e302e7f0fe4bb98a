use core::fmt;
use std::collections::BTreeMap;

use thiserror::Error;

use super::checksum::{sha256_hex, sidecar_path};

/// Read-only view of the resource tree. Paths are `/`-separated and already
/// include the store root.
pub trait ResourceFs {
    type Error: fmt::Display;

    fn exists(&self, path: &str) -> bool;

    /// File size in bytes.
    fn size(&self, path: &str) -> Result<usize, Self::Error>;

    fn read(&self, path: &str) -> Result<Vec<u8>, Self::Error>;

    /// File names (not paths) directly inside `dir`, sorted.
    fn list(&self, dir: &str) -> Result<Vec<String>, Self::Error>;
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{0}: no such file")]
pub struct MemoryFsError(pub String);

/// In-memory tree for tests and for the generated bundle.
#[derive(Clone, Debug, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    /// Insert `bytes` together with a matching `.sha256` sidecar.
    pub fn insert_sealed(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        self.files
            .insert(sidecar_path(path), format!("{}\n", sha256_hex(&bytes)).into_bytes());
        self.files.insert(path.into(), bytes);
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ResourceFs for MemoryFs {
    type Error = MemoryFsError;

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn size(&self, path: &str) -> Result<usize, Self::Error> {
        self.files
            .get(path)
            .map(Vec::len)
            .ok_or_else(|| MemoryFsError(path.into()))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, Self::Error> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| MemoryFsError(path.into()))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, Self::Error> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(prefix.as_str()))
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(String::from)
            .collect())
    }
}

//! Persisted prefix-to-namespace bindings.
//!
//! The whole table lives in memory and is rewritten to its file on
//! [`NamespaceStore::sync`] when dirty. The file carries a 3-byte magic
//! number, a format version byte, length-prefixed UTF-8 (name, prefix)
//! pairs and a crc32 trailer.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// File name of the namespace table within a store directory.
pub const NAMESPACES_FILE_NAME: &str = "namespaces.dat";

const MAGIC: &[u8; 3] = b"QNS";
const VERSION: u8 = 1;

/// In-memory, write-behind map from prefix to namespace name.
pub struct NamespaceStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl NamespaceStore {
    /// Opens the store, eagerly loading the persisted table if present.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(NAMESPACES_FILE_NAME);
        let mut store = Self {
            path,
            entries: BTreeMap::new(),
            dirty: false,
        };
        if store.path.exists() {
            store.load()?;
        }
        Ok(store)
    }

    /// Binds `prefix` to `name`, replacing any previous binding.
    pub fn set_namespace(&mut self, prefix: &str, name: &str) {
        let replaced = self.entries.insert(prefix.to_owned(), name.to_owned());
        if replaced.as_deref() != Some(name) {
            self.dirty = true;
        }
    }

    /// The namespace name bound to `prefix`, if any.
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(String::as_str)
    }

    /// Removes the binding for `prefix`.
    pub fn remove_namespace(&mut self, prefix: &str) {
        if self.entries.remove(prefix).is_some() {
            self.dirty = true;
        }
    }

    /// Iterates (prefix, name) pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, n)| (p.as_str(), n.as_str()))
    }

    /// Drops every binding.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    /// Writes the table out if it changed since the last sync.
    pub fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let parent = self.path.parent().ok_or_else(|| {
            StoreError::InvalidArgument(format!("{} has no parent directory", self.path.display()))
        })?;
        let mut payload = Vec::new();
        for (prefix, name) in &self.entries {
            write_string(&mut payload, name);
            write_string(&mut payload, prefix);
        }
        let mut crc = Hasher::new();
        crc.update(&payload);

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(MAGIC)?;
        tmp.write_all(&[VERSION])?;
        tmp.write_all(&payload)?;
        tmp.write_all(&crc.finalize().to_le_bytes())?;
        tmp.as_file().sync_data()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        self.dirty = false;
        debug!(namespaces = self.entries.len(), "namespace_store.sync");
        Ok(())
    }

    /// Syncs and releases the store.
    pub fn close(&mut self) -> Result<()> {
        self.sync()
    }

    fn load(&mut self) -> Result<()> {
        let bytes = fs::read(&self.path)?;
        if bytes.len() < MAGIC.len() + 1 + 4 {
            return Err(StoreError::Corruption(format!(
                "namespace file {} truncated",
                self.path.display()
            )));
        }
        if &bytes[..3] != MAGIC {
            return Err(StoreError::Corruption(format!(
                "bad magic in namespace file {}",
                self.path.display()
            )));
        }
        if bytes[3] != VERSION {
            return Err(StoreError::VersionMismatch(format!(
                "namespace file {} has version {}, expected {VERSION}",
                self.path.display(),
                bytes[3]
            )));
        }
        let payload = &bytes[4..bytes.len() - 4];
        let mut stored_crc = [0u8; 4];
        stored_crc.copy_from_slice(&bytes[bytes.len() - 4..]);
        let mut crc = Hasher::new();
        crc.update(payload);
        if crc.finalize() != u32::from_le_bytes(stored_crc) {
            return Err(StoreError::Corruption(format!(
                "checksum mismatch in namespace file {}",
                self.path.display()
            )));
        }

        let mut cursor = 0usize;
        while cursor < payload.len() {
            let name = read_string(payload, &mut cursor, &self.path)?;
            let prefix = read_string(payload, &mut cursor, &self.path)?;
            if self.entries.insert(prefix.clone(), name).is_some() {
                warn!(prefix = %prefix, "namespace_store.duplicate_prefix");
            }
        }
        debug!(namespaces = self.entries.len(), "namespace_store.load");
        Ok(())
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_string(payload: &[u8], cursor: &mut usize, path: &Path) -> Result<String> {
    let corrupt = || StoreError::Corruption(format!("namespace file {} truncated", path.display()));
    let len_bytes = payload.get(*cursor..*cursor + 4).ok_or_else(corrupt)?;
    let len = u32::from_le_bytes(len_bytes.try_into().map_err(|_| corrupt())?) as usize;
    *cursor += 4;
    let raw = payload.get(*cursor..*cursor + len).ok_or_else(corrupt)?;
    *cursor += len;
    String::from_utf8(raw.to_vec())
        .map_err(|_| StoreError::Corruption(format!("non-UTF-8 text in {}", path.display())))
}

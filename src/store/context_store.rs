//! Persisted per-context statement counts.
//!
//! Tracks how many statements each named graph holds so context enumeration
//! does not need an index scan. The table is idempotent to re-derive from
//! the triple store, which is exactly what happens when the file is missing
//! or damaged: [`ContextStore::open`] reports that a rebuild is needed and
//! the owning store repopulates it from a context-sorted scan.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// File name of the context-count table within a store directory.
pub const CONTEXTS_FILE_NAME: &str = "contexts.dat";

const MAGIC: &[u8; 3] = b"QCX";
const VERSION: u8 = 1;

/// A named-graph identifier: an IRI string or a blank-node id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextKey {
    /// Whether `text` is an IRI (false: blank node id).
    pub is_iri: bool,
    /// The IRI string or blank-node id.
    pub text: String,
}

impl ContextKey {
    /// Key for an IRI-named graph.
    pub fn iri(text: impl Into<String>) -> Self {
        Self {
            is_iri: true,
            text: text.into(),
        }
    }

    /// Key for a blank-node-named graph.
    pub fn bnode(text: impl Into<String>) -> Self {
        Self {
            is_iri: false,
            text: text.into(),
        }
    }
}

/// In-memory, write-behind table of per-context statement counts.
pub struct ContextStore {
    path: PathBuf,
    counts: BTreeMap<ContextKey, i64>,
    dirty: bool,
}

impl ContextStore {
    /// Opens the store. The boolean is true when the persisted table was
    /// missing or unreadable and must be rebuilt from the triple store.
    pub fn open(dir: &Path) -> Result<(Self, bool)> {
        let path = dir.join(CONTEXTS_FILE_NAME);
        let mut store = Self {
            path,
            counts: BTreeMap::new(),
            dirty: false,
        };
        if !store.path.exists() {
            return Ok((store, true));
        }
        match store.load() {
            Ok(()) => Ok((store, false)),
            Err(e) => {
                warn!(error = %e, "context_store.load_failed");
                store.counts.clear();
                Ok((store, true))
            }
        }
    }

    /// Adds one statement to `context`'s count.
    pub fn increment(&mut self, context: ContextKey) {
        *self.counts.entry(context).or_insert(0) += 1;
        self.dirty = true;
    }

    /// Subtracts `amount` statements from `context`'s count, dropping the
    /// entry when it reaches zero.
    pub fn decrement_by(&mut self, context: &ContextKey, amount: i64) {
        if let Some(count) = self.counts.get_mut(context) {
            *count -= amount;
            if *count <= 0 {
                self.counts.remove(context);
            }
            self.dirty = true;
        }
    }

    /// The statement count recorded for `context`.
    pub fn count(&self, context: &ContextKey) -> i64 {
        self.counts.get(context).copied().unwrap_or(0)
    }

    /// Iterates (context, count) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ContextKey, i64)> {
        self.counts.iter().map(|(k, &c)| (k, c))
    }

    /// Number of distinct contexts tracked.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no contexts are tracked.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        if !self.counts.is_empty() {
            self.counts.clear();
            self.dirty = true;
        }
    }

    /// Replaces the whole table, used by the rebuild-from-scan path.
    pub fn replace_all(&mut self, counts: BTreeMap<ContextKey, i64>) {
        self.counts = counts;
        self.dirty = true;
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
        payload.extend_from_slice(&(self.counts.len() as u32).to_le_bytes());
        for (key, count) in &self.counts {
            payload.extend_from_slice(&count.to_le_bytes());
            payload.push(key.is_iri as u8);
            payload.extend_from_slice(&(key.text.len() as u32).to_le_bytes());
            payload.extend_from_slice(key.text.as_bytes());
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
        debug!(contexts = self.counts.len(), "context_store.sync");
        Ok(())
    }

    /// Syncs and releases the store.
    pub fn close(&mut self) -> Result<()> {
        self.sync()
    }

    fn load(&mut self) -> Result<()> {
        let bytes = fs::read(&self.path)?;
        let corrupt =
            |what: &str| StoreError::Corruption(format!("context file {}: {what}", self.path.display()));
        if bytes.len() < MAGIC.len() + 1 + 4 + 4 {
            return Err(corrupt("truncated"));
        }
        if &bytes[..3] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        if bytes[3] != VERSION {
            return Err(StoreError::VersionMismatch(format!(
                "context file {} has version {}, expected {VERSION}",
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
            return Err(corrupt("checksum mismatch"));
        }

        let declared = u32::from_le_bytes(
            payload[..4]
                .try_into()
                .map_err(|_| corrupt("truncated count"))?,
        ) as usize;
        let mut cursor = 4usize;
        for _ in 0..declared {
            let count_bytes = payload
                .get(cursor..cursor + 8)
                .ok_or_else(|| corrupt("entry truncated"))?;
            let count = i64::from_le_bytes(
                count_bytes
                    .try_into()
                    .map_err(|_| corrupt("entry truncated"))?,
            );
            cursor += 8;
            let is_iri = match payload.get(cursor) {
                Some(0) => false,
                Some(1) => true,
                _ => return Err(corrupt("invalid context kind")),
            };
            cursor += 1;
            let len_bytes = payload
                .get(cursor..cursor + 4)
                .ok_or_else(|| corrupt("entry truncated"))?;
            let len = u32::from_le_bytes(
                len_bytes
                    .try_into()
                    .map_err(|_| corrupt("entry truncated"))?,
            ) as usize;
            cursor += 4;
            let raw = payload
                .get(cursor..cursor + len)
                .ok_or_else(|| corrupt("entry truncated"))?;
            cursor += len;
            let text = String::from_utf8(raw.to_vec()).map_err(|_| corrupt("non-UTF-8 text"))?;
            self.counts.insert(ContextKey { is_iri, text }, count);
        }
        if cursor != payload.len() {
            return Err(corrupt("trailing bytes after declared entries"));
        }
        if self.counts.len() != declared {
            return Err(corrupt("entry count does not match declared count"));
        }
        debug!(contexts = self.counts.len(), "context_store.load");
        Ok(())
    }
}

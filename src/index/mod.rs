//! Ordered storage of fixed-length quad records.
//!
//! A quad is stored as a 17-byte record: four big-endian `u32` term ids
//! (subject, predicate, object, context) followed by one flag byte. A
//! [`RecordIndex`] keeps one copy of every record sorted by a configurable
//! permutation of the four id fields ([`RecordOrder`]), supports ranged and
//! sequential scans with a key/mask filter, and persists itself as a
//! checksummed snapshot file that is atomically rewritten on [`RecordIndex::sync`].

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::model::ValueId;

/// Length of one quad record in bytes.
pub const RECORD_LEN: usize = 17;

/// Byte offset of the subject id within a record.
pub const SUBJ_OFF: usize = 0;
/// Byte offset of the predicate id within a record.
pub const PRED_OFF: usize = 4;
/// Byte offset of the object id within a record.
pub const OBJ_OFF: usize = 8;
/// Byte offset of the context id within a record.
pub const CTX_OFF: usize = 12;
/// Byte offset of the flag byte within a record.
pub const FLAG_OFF: usize = 16;

const KEY_LEN: usize = 16;

const INDEX_MAGIC: &[u8; 4] = b"QIDX";
const INDEX_VERSION: u8 = 1;
const INDEX_HEADER_LEN: usize = 4 + 1 + 4 + 8;

/// One quad record.
pub type Record = [u8; RECORD_LEN];

/// Builds a record from its four field ids and flag byte.
pub fn encode_record(subj: ValueId, pred: ValueId, obj: ValueId, ctx: ValueId, flags: u8) -> Record {
    let mut rec = [0u8; RECORD_LEN];
    rec[SUBJ_OFF..SUBJ_OFF + 4].copy_from_slice(&subj.to_be_bytes());
    rec[PRED_OFF..PRED_OFF + 4].copy_from_slice(&pred.to_be_bytes());
    rec[OBJ_OFF..OBJ_OFF + 4].copy_from_slice(&obj.to_be_bytes());
    rec[CTX_OFF..CTX_OFF + 4].copy_from_slice(&ctx.to_be_bytes());
    rec[FLAG_OFF] = flags;
    rec
}

fn field_at(rec: &Record, offset: usize) -> ValueId {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&rec[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

/// The subject id of a record.
pub fn subject_id(rec: &Record) -> ValueId {
    field_at(rec, SUBJ_OFF)
}

/// The predicate id of a record.
pub fn predicate_id(rec: &Record) -> ValueId {
    field_at(rec, PRED_OFF)
}

/// The object id of a record.
pub fn object_id(rec: &Record) -> ValueId {
    field_at(rec, OBJ_OFF)
}

/// The context id of a record (`0` = default graph).
pub fn context_id(rec: &Record) -> ValueId {
    field_at(rec, CTX_OFF)
}

/// The flag byte of a record.
pub fn record_flags(rec: &Record) -> u8 {
    rec[FLAG_OFF]
}

/// A quad pattern; `None` fields are wildcards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadPattern {
    /// Subject id to match, or wildcard.
    pub subj: Option<ValueId>,
    /// Predicate id to match, or wildcard.
    pub pred: Option<ValueId>,
    /// Object id to match, or wildcard.
    pub obj: Option<ValueId>,
    /// Context id to match, or wildcard.
    pub ctx: Option<ValueId>,
}

impl QuadPattern {
    /// A pattern matching every quad.
    pub fn any() -> Self {
        Self::default()
    }

    /// Record holding the pattern's bound ids (wildcards zero) and `flags`.
    pub fn search_key(&self, flags: u8) -> Record {
        encode_record(
            self.subj.unwrap_or(0),
            self.pred.unwrap_or(0),
            self.obj.unwrap_or(0),
            self.ctx.unwrap_or(0),
            flags,
        )
    }

    /// Mask with all-ones over bound fields and `flags_mask` over the flag byte.
    pub fn search_mask(&self, flags_mask: u8) -> Record {
        encode_record(
            if self.subj.is_some() { u32::MAX } else { 0 },
            if self.pred.is_some() { u32::MAX } else { 0 },
            if self.obj.is_some() { u32::MAX } else { 0 },
            if self.ctx.is_some() { u32::MAX } else { 0 },
            flags_mask,
        )
    }

    /// Smallest record that can match the pattern (wildcards at zero).
    pub fn min_record(&self) -> Record {
        encode_record(
            self.subj.unwrap_or(0),
            self.pred.unwrap_or(0),
            self.obj.unwrap_or(0),
            self.ctx.unwrap_or(0),
            0x00,
        )
    }

    /// Largest record that can match the pattern (wildcards at max).
    pub fn max_record(&self) -> Record {
        encode_record(
            self.subj.unwrap_or(u32::MAX),
            self.pred.unwrap_or(u32::MAX),
            self.obj.unwrap_or(u32::MAX),
            self.ctx.unwrap_or(u32::MAX),
            0xff,
        )
    }
}

/// Tests a record against a search key under a mask: every masked bit of the
/// record must equal the corresponding key bit.
pub fn matches(rec: &Record, key: &Record, mask: &Record) -> bool {
    rec.iter()
        .zip(key.iter())
        .zip(mask.iter())
        .all(|((r, k), m)| (r ^ k) & m == 0)
}

/// One of the four id fields of a quad record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Subject position.
    Subject,
    /// Predicate position.
    Predicate,
    /// Object position.
    Object,
    /// Context position.
    Context,
}

impl Field {
    fn offset(self) -> usize {
        match self {
            Field::Subject => SUBJ_OFF,
            Field::Predicate => PRED_OFF,
            Field::Object => OBJ_OFF,
            Field::Context => CTX_OFF,
        }
    }

    fn letter(self) -> char {
        match self {
            Field::Subject => 's',
            Field::Predicate => 'p',
            Field::Object => 'o',
            Field::Context => 'c',
        }
    }

    fn bound_in(self, pattern: &QuadPattern) -> bool {
        match self {
            Field::Subject => pattern.subj.is_some(),
            Field::Predicate => pattern.pred.is_some(),
            Field::Object => pattern.obj.is_some(),
            Field::Context => pattern.ctx.is_some(),
        }
    }
}

/// A permutation of the four record fields, e.g. `spoc` or `posc`,
/// defining a sort order over records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOrder {
    fields: [Field; 4],
}

impl RecordOrder {
    /// Parses a four-letter permutation of `s`, `p`, `o` and `c`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim().to_ascii_lowercase();
        if spec.len() != 4 {
            return Err(StoreError::InvalidArgument(format!(
                "index order '{spec}' must be four characters long"
            )));
        }
        let mut fields = [Field::Subject; 4];
        let mut seen = [false; 4];
        for (slot, ch) in fields.iter_mut().zip(spec.chars()) {
            let (field, pos) = match ch {
                's' => (Field::Subject, 0),
                'p' => (Field::Predicate, 1),
                'o' => (Field::Object, 2),
                'c' => (Field::Context, 3),
                other => {
                    return Err(StoreError::InvalidArgument(format!(
                        "invalid character '{other}' in index order '{spec}'"
                    )))
                }
            };
            if seen[pos] {
                return Err(StoreError::InvalidArgument(format!(
                    "duplicate field '{ch}' in index order '{spec}'"
                )));
            }
            seen[pos] = true;
            *slot = field;
        }
        Ok(Self { fields })
    }

    /// The four-letter name of this order, e.g. `"spoc"`.
    pub fn name(&self) -> String {
        self.fields.iter().map(|f| f.letter()).collect()
    }

    /// The field in the leading (most significant) sort position.
    pub fn leading_field(&self) -> Field {
        self.fields[0]
    }

    /// The record's id fields rearranged into this order's significance.
    pub fn key_of(&self, rec: &Record) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        for (slot, field) in self.fields.iter().enumerate() {
            let off = field.offset();
            key[slot * 4..slot * 4 + 4].copy_from_slice(&rec[off..off + 4]);
        }
        key
    }

    /// Scores how well this order serves `pattern`: one point per leading
    /// field the pattern binds, stopping at the first unbound field. Zero
    /// means a scan of this index cannot be ranged.
    pub fn pattern_score(&self, pattern: &QuadPattern) -> u32 {
        let mut score = 0;
        for field in &self.fields {
            if field.bound_in(pattern) {
                score += 1;
            } else {
                break;
            }
        }
        score
    }
}

/// A disk-backed set of quad records sorted by a [`RecordOrder`].
///
/// At most one record exists per (subject, predicate, object, context)
/// combination; inserting a record whose ids already exist replaces the
/// stored flag byte. Mutations accumulate in memory and reach disk on
/// [`RecordIndex::sync`], which rewrites the snapshot file atomically.
pub struct RecordIndex {
    path: PathBuf,
    order: RecordOrder,
    records: BTreeMap<[u8; KEY_LEN], Record>,
    dirty: bool,
    force_sync: bool,
}

impl RecordIndex {
    /// Opens the index at `path`, loading the snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>, order: RecordOrder, force_sync: bool) -> Result<Self> {
        let path = path.into();
        let mut index = Self {
            path,
            order,
            records: BTreeMap::new(),
            dirty: false,
            force_sync,
        };
        if index.path.exists() {
            index.load()?;
        }
        Ok(index)
    }

    /// The sort order of this index.
    pub fn order(&self) -> RecordOrder {
        self.order
    }

    /// The snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts or replaces a record. Returns true when the stored bytes changed.
    pub fn insert(&mut self, rec: Record) -> bool {
        let key = self.order.key_of(&rec);
        let changed = self.records.insert(key, rec) != Some(rec);
        self.dirty |= changed;
        changed
    }

    /// Removes the record with `rec`'s id fields. Returns true if present.
    pub fn remove(&mut self, rec: &Record) -> bool {
        let key = self.order.key_of(rec);
        let removed = self.records.remove(&key).is_some();
        self.dirty |= removed;
        removed
    }

    /// Looks up the stored record with the same id fields as `rec`.
    pub fn get(&self, rec: &Record) -> Option<Record> {
        self.records.get(&self.order.key_of(rec)).copied()
    }

    /// All records between `min` and `max` (inclusive, in this index's order)
    /// that match `key` under `mask`.
    pub fn range(&self, min: &Record, max: &Record, key: &Record, mask: &Record) -> Vec<Record> {
        let lo = self.order.key_of(min);
        let hi = self.order.key_of(max);
        self.records
            .range((Bound::Included(lo), Bound::Included(hi)))
            .map(|(_, rec)| *rec)
            .filter(|rec| matches(rec, key, mask))
            .collect()
    }

    /// All records matching `key` under `mask`, in index order.
    pub fn scan(&self, key: &Record, mask: &Record) -> Vec<Record> {
        self.records
            .values()
            .copied()
            .filter(|rec| matches(rec, key, mask))
            .collect()
    }

    /// Every record, in index order.
    pub fn scan_all(&self) -> Vec<Record> {
        self.records.values().copied().collect()
    }

    /// Estimated total record count.
    pub fn count_estimate(&self) -> u64 {
        self.records.len() as u64
    }

    /// Estimated record count between `min` and `max` in this index's order.
    pub fn range_count_estimate(&self, min: &Record, max: &Record) -> u64 {
        let lo = self.order.key_of(min);
        let hi = self.order.key_of(max);
        self.records
            .range((Bound::Included(lo), Bound::Included(hi)))
            .count() as u64
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            self.records.clear();
            self.dirty = true;
        }
    }

    /// Persists the current contents if they changed since the last sync.
    pub fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let parent = self.path.parent().ok_or_else(|| {
            StoreError::InvalidArgument(format!("index path {} has no parent", self.path.display()))
        })?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        self.write_snapshot(tmp.as_file_mut())?;
        if self.force_sync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        self.dirty = false;
        trace!(
            index = %self.order.name(),
            records = self.records.len(),
            "index.sync"
        );
        Ok(())
    }

    /// Syncs and drops the in-memory contents.
    pub fn close(&mut self) -> Result<()> {
        self.sync()?;
        self.records.clear();
        Ok(())
    }

    /// Deletes the snapshot file, leaving the index empty.
    pub fn delete_files(&mut self) -> Result<()> {
        self.records.clear();
        self.dirty = false;
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        debug!(index = %self.order.name(), "index.delete_files");
        Ok(())
    }

    fn write_snapshot(&self, out: &mut fs::File) -> Result<()> {
        let mut header = Vec::with_capacity(INDEX_HEADER_LEN);
        header.extend_from_slice(INDEX_MAGIC);
        header.push(INDEX_VERSION);
        header.extend_from_slice(self.order.name().as_bytes());
        header.extend_from_slice(&(self.records.len() as u64).to_le_bytes());
        out.write_all(&header)?;
        let mut crc = Hasher::new();
        for rec in self.records.values() {
            out.write_all(rec)?;
            crc.update(rec);
        }
        out.write_all(&crc.finalize().to_le_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let mut file = fs::File::open(&self.path)?;
        let mut header = [0u8; INDEX_HEADER_LEN];
        file.read_exact(&mut header).map_err(|_| {
            StoreError::Corruption(format!("index file {} truncated", self.path.display()))
        })?;
        if &header[..4] != INDEX_MAGIC {
            return Err(StoreError::Corruption(format!(
                "bad magic in index file {}",
                self.path.display()
            )));
        }
        if header[4] != INDEX_VERSION {
            return Err(StoreError::VersionMismatch(format!(
                "index file {} has version {}, expected {}",
                self.path.display(),
                header[4],
                INDEX_VERSION
            )));
        }
        let stored_order = std::str::from_utf8(&header[5..9])
            .map_err(|_| StoreError::Corruption("index order bytes are not UTF-8".into()))?;
        if stored_order != self.order.name() {
            return Err(StoreError::Corruption(format!(
                "index file {} is ordered '{}', expected '{}'",
                self.path.display(),
                stored_order,
                self.order.name()
            )));
        }
        let mut count_buf = [0u8; 8];
        count_buf.copy_from_slice(&header[9..17]);
        let count = u64::from_le_bytes(count_buf);

        let mut crc = Hasher::new();
        let mut rec = [0u8; RECORD_LEN];
        for _ in 0..count {
            file.read_exact(&mut rec).map_err(|_| {
                StoreError::Corruption(format!(
                    "index file {} shorter than its record count",
                    self.path.display()
                ))
            })?;
            crc.update(&rec);
            self.records.insert(self.order.key_of(&rec), rec);
        }
        let mut stored_crc = [0u8; 4];
        file.read_exact(&mut stored_crc).map_err(|_| {
            StoreError::Corruption(format!("index file {} missing checksum", self.path.display()))
        })?;
        if u32::from_le_bytes(stored_crc) != crc.finalize() {
            return Err(StoreError::Corruption(format!(
                "checksum mismatch in index file {}",
                self.path.display()
            )));
        }
        if self.records.len() as u64 != count {
            return Err(StoreError::Corruption(format!(
                "index file {} contains duplicate records",
                self.path.display()
            )));
        }
        self.dirty = false;
        debug!(
            index = %self.order.name(),
            records = self.records.len(),
            "index.load"
        );
        Ok(())
    }
}

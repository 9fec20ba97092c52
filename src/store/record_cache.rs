//! Transaction-scoped staging buffers for quad records.
//!
//! A record cache is an append-mostly multiset of records produced during
//! one transaction. Three backings hide behind one handle: a plain vector
//! for small deltas, a sequential temp file once memory is tight, and a
//! sorted variant (same ordering as the primary index) used to replay the
//! transaction's changeset at commit/rollback. The backing is swapped with
//! an explicit [`RecordCache::promote_to_disk`] transition, never in place.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::index::{Record, RecordOrder, RECORD_LEN};

const SEQ_MAGIC: &[u8; 4] = b"QRCS";
const SEQ_VERSION: u8 = 1;
const SEQ_HEADER_LEN: u64 = 5;

/// Iterator over a cache's records.
pub struct RecordCacheIter(std::vec::IntoIter<Record>);

impl Iterator for RecordCacheIter {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.0.next()
    }
}

/// Growable in-memory record list.
pub struct InMemRecordCache {
    records: Vec<Record>,
    stored: u64,
    max_records: Option<u64>,
}

impl InMemRecordCache {
    /// An unbounded in-memory cache.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            stored: 0,
            max_records: None,
        }
    }
}

impl Default for InMemRecordCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size records appended to an anonymous temp file.
pub struct SequentialRecordCache {
    file: File,
    stored: u64,
    written: u64,
    max_records: Option<u64>,
}

impl SequentialRecordCache {
    /// Creates the backing temp file inside `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        let mut file = tempfile::tempfile_in(dir)?;
        file.write_all(SEQ_MAGIC)?;
        file.write_all(&[SEQ_VERSION])?;
        Ok(Self {
            file,
            stored: 0,
            written: 0,
            max_records: None,
        })
    }

    fn read_all(&mut self) -> Result<Vec<Record>> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; SEQ_HEADER_LEN as usize];
        self.file.read_exact(&mut header)?;
        if &header[..4] != SEQ_MAGIC || header[4] != SEQ_VERSION {
            return Err(StoreError::Corruption(
                "record cache file header damaged".to_owned(),
            ));
        }
        let mut records = Vec::with_capacity(self.written as usize);
        let mut rec = [0u8; RECORD_LEN];
        for _ in 0..self.written {
            self.file.read_exact(&mut rec).map_err(|_| {
                StoreError::Corruption("record cache file shorter than its record count".to_owned())
            })?;
            records.push(rec);
        }
        Ok(records)
    }
}

/// Records kept sorted by an index ordering; storing a record whose id
/// fields already exist replaces the buffered flag byte.
pub struct SortedRecordCache {
    order: RecordOrder,
    records: BTreeMap<[u8; 16], Record>,
    stored: u64,
    max_records: Option<u64>,
}

impl SortedRecordCache {
    /// An empty sorted cache with the given replay order, invalid once more
    /// than `max_records` stores have happened.
    pub fn new(order: RecordOrder, max_records: Option<u64>) -> Self {
        Self {
            order,
            records: BTreeMap::new(),
            stored: 0,
            max_records,
        }
    }
}

/// A transaction staging buffer behind one of three backings.
pub enum RecordCache {
    /// Plain vector, the starting backing.
    InMem(InMemRecordCache),
    /// Sequential temp file, for large unordered deltas.
    Sequential(SequentialRecordCache),
    /// Sorted buffer replayed in index order at commit/rollback.
    Sorted(SortedRecordCache),
}

impl RecordCache {
    /// Appends one record.
    ///
    /// Once the cache has seen more stores than its configured maximum it
    /// turns invalid and drops further records; callers detect this through
    /// [`RecordCache::is_valid`] and fall back to full index scans.
    pub fn store_record(&mut self, rec: &Record) -> Result<()> {
        match self {
            RecordCache::InMem(c) => {
                c.stored += 1;
                if c.max_records.within(c.stored) {
                    c.records.push(*rec);
                }
            }
            RecordCache::Sequential(c) => {
                c.stored += 1;
                if c.max_records.within(c.stored) {
                    c.file.seek(SeekFrom::End(0))?;
                    c.file.write_all(rec)?;
                    c.written += 1;
                }
            }
            RecordCache::Sorted(c) => {
                c.stored += 1;
                if c.max_records.within(c.stored) {
                    c.records.insert(c.order.key_of(rec), *rec);
                }
            }
        }
        Ok(())
    }

    /// Bulk-copies every record of `other` into this cache.
    pub fn store_records(&mut self, other: &mut RecordCache) -> Result<()> {
        for rec in other.records()? {
            self.store_record(&rec)?;
        }
        Ok(())
    }

    /// Iterates the buffered records (sorted caches yield replay order).
    pub fn records(&mut self) -> Result<RecordCacheIter> {
        let records = match self {
            RecordCache::InMem(c) => c.records.clone(),
            RecordCache::Sequential(c) => c.read_all()?,
            RecordCache::Sorted(c) => c.records.values().copied().collect(),
        };
        Ok(RecordCacheIter(records.into_iter()))
    }

    /// Number of store operations seen (not deduplicated).
    pub fn record_count(&self) -> u64 {
        match self {
            RecordCache::InMem(c) => c.stored,
            RecordCache::Sequential(c) => c.stored,
            RecordCache::Sorted(c) => c.stored,
        }
    }

    /// False once more records were stored than the configured maximum.
    pub fn is_valid(&self) -> bool {
        let (stored, max) = match self {
            RecordCache::InMem(c) => (c.stored, c.max_records),
            RecordCache::Sequential(c) => (c.stored, c.max_records),
            RecordCache::Sorted(c) => (c.stored, c.max_records),
        };
        max.within(stored)
    }

    /// Replaces the maximum store count (`None` = unbounded).
    pub fn set_max_records(&mut self, max: Option<u64>) {
        match self {
            RecordCache::InMem(c) => c.max_records = max,
            RecordCache::Sequential(c) => c.max_records = max,
            RecordCache::Sorted(c) => c.max_records = max,
        }
    }

    /// Drops all buffered records, keeping the backing usable.
    pub fn clear(&mut self) -> Result<()> {
        match self {
            RecordCache::InMem(c) => {
                c.records.clear();
                c.stored = 0;
            }
            RecordCache::Sequential(c) => {
                c.file.set_len(SEQ_HEADER_LEN)?;
                c.file.seek(SeekFrom::End(0))?;
                c.stored = 0;
                c.written = 0;
            }
            RecordCache::Sorted(c) => {
                c.records.clear();
                c.stored = 0;
            }
        }
        Ok(())
    }

    /// Releases the cache and any backing file.
    pub fn discard(self) {
        // Sequential backings use anonymous temp files; dropping the handle
        // removes them.
    }

    /// Moves an in-memory cache onto disk; other backings are untouched.
    pub fn promote_to_disk(&mut self, dir: &Path) -> Result<()> {
        if !matches!(self, RecordCache::InMem(_)) {
            return Ok(());
        }
        debug!(records = self.record_count(), "record_cache.promote_to_disk");
        let mut sequential = SequentialRecordCache::create(dir)?;
        if let RecordCache::InMem(c) = self {
            sequential.max_records = c.max_records;
            for rec in &c.records {
                sequential.file.write_all(rec)?;
            }
            sequential.stored = c.stored;
            sequential.written = c.records.len() as u64;
        }
        *self = RecordCache::Sequential(sequential);
        Ok(())
    }
}

trait MaxRecords {
    /// Whether `stored` operations stay within this bound.
    fn within(&self, stored: u64) -> bool;
}

impl MaxRecords for Option<u64> {
    fn within(&self, stored: u64) -> bool {
        match self {
            Some(max) => stored <= *max,
            None => true,
        }
    }
}

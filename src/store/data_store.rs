//! Content-addressed storage of encoded values.
//!
//! Every distinct byte pattern is stored once and assigned the next
//! positive id. The backing is an append-only data file of length-prefixed
//! entries plus an id file mapping each id to its data-file offset; a
//! content hash index for deduplication is rebuilt from those files on open.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, trace};
use xxhash_rust::xxh64::xxh64;

use crate::error::{Result, StoreError};
use crate::model::ValueId;

const DATA_MAGIC: &[u8; 4] = b"QVDF";
const ID_MAGIC: &[u8; 4] = b"QVID";
const FILE_VERSION: u8 = 1;
const HEADER_LEN: u64 = 5;

/// Longest accepted entry; anything larger is treated as corruption when read back.
const MAX_DATA_LEN: u32 = 64 * 1024 * 1024;

struct Inner {
    data_file: File,
    id_file: File,
    /// Data-file offset per id; index `i` holds id `i + 1`.
    offsets: Vec<u64>,
    /// xxh64(content) to candidate ids; candidates verify by byte comparison.
    hash_index: HashMap<u64, Vec<ValueId>>,
}

/// Deduplicating append-only store of byte patterns keyed by integer id.
pub struct DataStore {
    inner: Mutex<Inner>,
    data_path: PathBuf,
    force_sync: bool,
}

impl DataStore {
    /// Opens or creates the store files `<prefix>.dat` and `<prefix>.id` in `dir`.
    pub fn open(dir: &Path, prefix: &str, force_sync: bool) -> Result<Self> {
        let data_path = dir.join(format!("{prefix}.dat"));
        let id_path = dir.join(format!("{prefix}.id"));
        let mut data_file = open_store_file(&data_path, DATA_MAGIC)?;
        let mut id_file = open_store_file(&id_path, ID_MAGIC)?;

        let offsets = read_offsets(&mut id_file, &id_path)?;
        let mut hash_index: HashMap<u64, Vec<ValueId>> = HashMap::new();
        for (i, &offset) in offsets.iter().enumerate() {
            let data = read_entry(&mut data_file, offset, &data_path)?;
            hash_index
                .entry(xxh64(&data, 0))
                .or_default()
                .push((i + 1) as ValueId);
        }
        debug!(values = offsets.len(), path = %data_path.display(), "data_store.open");

        Ok(Self {
            inner: Mutex::new(Inner {
                data_file,
                id_file,
                offsets,
                hash_index,
            }),
            data_path,
            force_sync,
        })
    }

    /// Stores `data`, deduplicating by content. Returns the id and whether
    /// the entry is newly minted.
    pub fn store_data(&self, data: &[u8]) -> Result<(ValueId, bool)> {
        if data.len() > MAX_DATA_LEN as usize {
            return Err(StoreError::InvalidArgument(format!(
                "value of {} bytes exceeds the {MAX_DATA_LEN} byte limit",
                data.len()
            )));
        }
        let hash = xxh64(data, 0);
        let mut inner = self.inner.lock();
        if let Some(candidates) = inner.hash_index.get(&hash) {
            let candidates = candidates.clone();
            for id in candidates {
                let offset = inner.offsets[(id - 1) as usize];
                let stored = read_entry(&mut inner.data_file, offset, &self.data_path)?;
                if stored == data {
                    return Ok((id, false));
                }
            }
        }

        let offset = inner.data_file.seek(SeekFrom::End(0))?;
        inner.data_file.write_all(&(data.len() as u32).to_le_bytes())?;
        inner.data_file.write_all(data)?;
        inner.id_file.seek(SeekFrom::End(0))?;
        inner.id_file.write_all(&offset.to_le_bytes())?;
        if self.force_sync {
            inner.data_file.sync_data()?;
            inner.id_file.sync_data()?;
        }

        inner.offsets.push(offset);
        let id = inner.offsets.len() as ValueId;
        inner.hash_index.entry(hash).or_default().push(id);
        trace!(id, len = data.len(), "data_store.store");
        Ok((id, true))
    }

    /// Reads the entry stored under `id`, or `None` for unassigned ids.
    pub fn get_data(&self, id: ValueId) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let Some(&offset) = id.checked_sub(1).and_then(|i| inner.offsets.get(i as usize)) else {
            return Ok(None);
        };
        read_entry(&mut inner.data_file, offset, &self.data_path).map(Some)
    }

    /// Looks up the id of `data` without storing it.
    pub fn get_id(&self, data: &[u8]) -> Result<Option<ValueId>> {
        let hash = xxh64(data, 0);
        let mut inner = self.inner.lock();
        let Some(candidates) = inner.hash_index.get(&hash) else {
            return Ok(None);
        };
        let candidates = candidates.clone();
        for id in candidates {
            let offset = inner.offsets[(id - 1) as usize];
            let stored = read_entry(&mut inner.data_file, offset, &self.data_path)?;
            if stored == data {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// The highest assigned id, or `0` when the store is empty.
    pub fn max_id(&self) -> ValueId {
        self.inner.lock().offsets.len() as ValueId
    }

    /// Drops every entry, truncating the backing files.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.data_file.set_len(HEADER_LEN)?;
        inner.id_file.set_len(HEADER_LEN)?;
        inner.data_file.sync_data()?;
        inner.id_file.sync_data()?;
        inner.offsets.clear();
        inner.hash_index.clear();
        debug!("data_store.clear");
        Ok(())
    }

    /// Flushes both backing files.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.data_file.sync_data()?;
        inner.id_file.sync_data()?;
        Ok(())
    }

    /// Flushes and releases the backing files.
    pub fn close(&self) -> Result<()> {
        self.sync()
    }
}

fn open_store_file(path: &Path, magic: &[u8; 4]) -> Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        file.write_all(magic)?;
        file.write_all(&[FILE_VERSION])?;
        file.sync_data()?;
        return Ok(file);
    }
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)
        .map_err(|_| StoreError::Corruption(format!("truncated header in {}", path.display())))?;
    if &header[..4] != magic {
        return Err(StoreError::Corruption(format!(
            "bad magic in {}",
            path.display()
        )));
    }
    if header[4] != FILE_VERSION {
        return Err(StoreError::VersionMismatch(format!(
            "{} has version {}, expected {FILE_VERSION}",
            path.display(),
            header[4]
        )));
    }
    Ok(file)
}

fn read_offsets(id_file: &mut File, path: &Path) -> Result<Vec<u64>> {
    let len = id_file.metadata()?.len();
    let payload = len - HEADER_LEN;
    if payload % 8 != 0 {
        return Err(StoreError::Corruption(format!(
            "id file {} has a partial entry",
            path.display()
        )));
    }
    id_file.seek(SeekFrom::Start(HEADER_LEN))?;
    let mut offsets = Vec::with_capacity((payload / 8) as usize);
    let mut buf = [0u8; 8];
    for _ in 0..payload / 8 {
        id_file.read_exact(&mut buf)?;
        offsets.push(u64::from_le_bytes(buf));
    }
    Ok(offsets)
}

fn read_entry(data_file: &mut File, offset: u64, path: &Path) -> Result<Vec<u8>> {
    data_file.seek(SeekFrom::Start(offset))?;
    let mut len_buf = [0u8; 4];
    data_file
        .read_exact(&mut len_buf)
        .map_err(|_| StoreError::Corruption(format!("entry offset out of range in {}", path.display())))?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_DATA_LEN {
        return Err(StoreError::Corruption(format!(
            "entry length {len} out of range in {}",
            path.display()
        )));
    }
    let mut data = vec![0u8; len as usize];
    data_file
        .read_exact(&mut data)
        .map_err(|_| StoreError::Corruption(format!("entry truncated in {}", path.display())))?;
    Ok(data)
}

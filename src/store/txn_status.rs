//! Persisted transaction-status marker.
//!
//! A single byte records which phase, if any, a transaction was in when the
//! process last ran. Startup recovery keys off this byte: anything other
//! than [`TxnStatus::None`] means an interrupted transaction whose phase
//! must be completed before the store is usable.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::trace;

use crate::error::Result;

/// File name of the status marker within a store directory.
pub const TXN_STATUS_FILE_NAME: &str = "txn-status";

/// Phase of the on-disk transaction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// No transaction in progress.
    None,
    /// A transaction has started but neither committed nor rolled back.
    Active,
    /// A commit is being applied to the indexes.
    Committing,
    /// A rollback is being applied to the indexes.
    RollingBack,
    /// The stored byte was unrecognized; treated as needing a rollback.
    Unknown,
}

impl TxnStatus {
    fn to_byte(self) -> u8 {
        match self {
            TxnStatus::None => b'n',
            TxnStatus::Active => b'a',
            TxnStatus::Committing => b'c',
            TxnStatus::RollingBack => b'r',
            TxnStatus::Unknown => b'u',
        }
    }

    fn from_byte(byte: u8) -> Self {
        match byte {
            b'n' => TxnStatus::None,
            b'a' => TxnStatus::Active,
            b'c' => TxnStatus::Committing,
            b'r' => TxnStatus::RollingBack,
            _ => TxnStatus::Unknown,
        }
    }
}

/// A single-byte status file with an always-open handle written in place.
pub struct TxnStatusFile {
    file: File,
}

impl TxnStatusFile {
    /// Opens or creates the status file in `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(TXN_STATUS_FILE_NAME))?;
        Ok(Self { file })
    }

    /// Reads the persisted status. An empty file reads as [`TxnStatus::None`].
    pub fn status(&mut self) -> Result<TxnStatus> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut byte = [0u8; 1];
        match self.file.read(&mut byte)? {
            0 => Ok(TxnStatus::None),
            _ => Ok(TxnStatus::from_byte(byte[0])),
        }
    }

    /// Persists `status`, fsyncing when `force_sync` is set.
    pub fn set_status(&mut self, status: TxnStatus, force_sync: bool) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&[status.to_byte()])?;
        self.file.set_len(1)?;
        if force_sync {
            self.file.sync_data()?;
        }
        trace!(?status, "txn_status.set");
        Ok(())
    }
}

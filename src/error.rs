//! Error and result types shared across the engine.

use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// On-disk data failed structural validation.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// A caller-supplied argument is out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Persisted data uses a format this build cannot read.
    #[error("format version mismatch: {0}")]
    VersionMismatch(String),
    /// The write-ahead log writer failed; surfaced on the next barrier.
    #[error("write-ahead log failure: {0}")]
    Wal(String),
}

//! Store configuration, passed explicitly at construction.

use std::time::Duration;

/// Tuning knobs for the value-store write-ahead log writer thread.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Capacity of the bounded producer queue; full queues block producers.
    pub queue_capacity: usize,
    /// Number of buffered entries that triggers a flush.
    pub max_batch: usize,
    /// Flush the log when this much time has passed since the last flush.
    pub flush_interval: Duration,
    /// Force a flush after every single entry, trading throughput for durability.
    pub sync_on_every_write: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8192,
            max_batch: 256,
            flush_interval: Duration::from_millis(50),
            sync_on_every_write: false,
        }
    }
}

/// Configuration for a [`QuadStore`](crate::store::QuadStore), passed at
/// construction instead of being read from ambient global state.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Comma-separated quad index permutations, e.g. `"spoc,posc"`.
    pub index_spec: String,
    /// Fsync index, data and status files on every phase boundary.
    pub force_sync: bool,
    /// Decode failures yield [`Term::Corrupt`](crate::model::Term) sentinels
    /// instead of errors, keeping a damaged store readable for inspection.
    pub soft_fail_on_corrupt_data: bool,
    /// Capacity of the id-to-term cache.
    pub value_cache_size: usize,
    /// Capacity of the encoded-term-to-id cache.
    pub value_id_cache_size: usize,
    /// Capacity of the id-to-namespace cache.
    pub namespace_cache_size: usize,
    /// Capacity of the namespace-to-id cache.
    pub namespace_id_cache_size: usize,
    /// In-memory byte budget for the removal scratch cache before it
    /// overflows to a temp file.
    pub remove_overflow_bytes: usize,
    /// Write-ahead log tuning.
    pub wal: WalConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_spec: "spoc,posc".to_owned(),
            force_sync: false,
            soft_fail_on_corrupt_data: false,
            value_cache_size: 512,
            value_id_cache_size: 128,
            namespace_cache_size: 64,
            namespace_id_cache_size: 32,
            remove_overflow_bytes: 128 * 1024 * 1024,
            wal: WalConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Durable preset: every phase boundary and WAL entry is fsynced.
    pub fn fully_durable() -> Self {
        Self {
            force_sync: true,
            wal: WalConfig {
                sync_on_every_write: true,
                ..WalConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset for inspecting a damaged store without failing on decode.
    pub fn salvage() -> Self {
        Self {
            soft_fail_on_corrupt_data: true,
            ..Self::default()
        }
    }
}

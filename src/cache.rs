//! Bounded concurrent caches used by the value store.
//!
//! Eviction is approximate: a cleanup pass runs every
//! [`CLEANUP_INTERVAL`] puts rather than on every put, and removes the
//! stalest entries until the cache is back under capacity. Between cleanup
//! passes the cache may hold up to one interval's worth of extra entries.
//! Callers must treat hit/miss behavior as approximate.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

const SHARD_COUNT: usize = 16;

/// Number of puts between eviction passes.
pub const CLEANUP_INTERVAL: u64 = 32;

struct Entry<V> {
    value: V,
    stamp: u64,
}

/// A striped map bounded to roughly `capacity` entries.
pub struct ConcurrentCache<K, V> {
    shards: Vec<Mutex<HashMap<K, Entry<V>>>>,
    capacity: usize,
    clock: AtomicU64,
    puts: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> ConcurrentCache<K, V> {
    /// Creates a cache bounded to roughly `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            puts: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &K) -> &Mutex<HashMap<K, Entry<V>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Looks up `key`, refreshing its recency stamp on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut shard = self.shard(key).lock();
        let entry = shard.get_mut(key)?;
        entry.stamp = self.tick();
        Some(entry.value.clone())
    }

    /// Inserts or replaces `key`, then maybe runs an eviction pass.
    pub fn put(&self, key: K, value: V) {
        let stamp = self.tick();
        self.shard(&key).lock().insert(key, Entry { value, stamp });
        if self.puts.fetch_add(1, Ordering::Relaxed) % CLEANUP_INTERVAL == CLEANUP_INTERVAL - 1 {
            self.evict_to_capacity();
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    /// Current entry count across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    fn evict_to_capacity(&self) {
        let len = self.len();
        if len <= self.capacity {
            return;
        }
        // Find the stamp cutoff below which entries are dropped. Collecting
        // all stamps is acceptable at cache-sized populations.
        let mut stamps: Vec<u64> = Vec::with_capacity(len);
        for shard in &self.shards {
            stamps.extend(shard.lock().values().map(|e| e.stamp));
        }
        stamps.sort_unstable();
        let drop_count = stamps.len().saturating_sub(self.capacity);
        if drop_count == 0 {
            return;
        }
        let cutoff = stamps[drop_count - 1];
        for shard in &self.shards {
            shard.lock().retain(|_, e| e.stamp > cutoff);
        }
    }
}

//! Cache storage: a bounded key→entry map with MRU eviction and
//! per-key atomic read-modify-write.

use crate::base::error::CoreError;
use crate::cache::entry::CacheEntry;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read-modify-write callback: receives the current entry (if any) and
/// returns the replacement (`None` removes the entry).
pub type UpdateFn = Box<dyn FnOnce(Option<Arc<CacheEntry>>) -> Option<CacheEntry> + Send>;

/// Pluggable entry storage behind the caching execution chain.
///
/// `update` must be atomic with respect to concurrent `get`/`put`/
/// `remove` on the same key; other keys stay concurrently accessible.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>, CoreError>;
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CoreError>;
    async fn remove(&self, key: &str) -> Result<(), CoreError>;
    async fn update(&self, key: &str, f: UpdateFn) -> Result<(), CoreError>;
    async fn clear(&self) -> Result<(), CoreError>;
    async fn entry_count(&self) -> Result<usize, CoreError>;
}

struct Stored {
    entry: Arc<CacheEntry>,
    last_access: AtomicU64,
}

impl Stored {
    fn new(entry: CacheEntry, stamp: u64) -> Self {
        Self { entry: Arc::new(entry), last_access: AtomicU64::new(stamp) }
    }
}

/// In-memory store. Entries carry a monotone access stamp; insertion
/// over capacity evicts the least-recently-accessed entry. Capacity 0
/// stores nothing.
pub struct MemoryCacheStore {
    entries: DashMap<String, Stored>,
    capacity: usize,
    tick: AtomicU64,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        Self { entries: DashMap::new(), capacity, tick: AtomicU64::new(0) }
    }

    fn stamp(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict least-recently-accessed entries until within capacity.
    /// Must not be called while an entry guard is held.
    fn evict_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let coldest = self
                .entries
                .iter()
                .min_by_key(|kv| kv.value().last_access.load(Ordering::Relaxed))
                .map(|kv| kv.key().clone());
            match coldest {
                Some(key) => {
                    tracing::debug!(key = %key, "evicting least-recently-used cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>, CoreError> {
        if self.capacity == 0 {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|kv| {
            kv.value().last_access.store(self.stamp(), Ordering::Relaxed);
            kv.value().entry.clone()
        }))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CoreError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let stamp = self.stamp();
        self.entries.insert(key.to_string(), Stored::new(entry, stamp));
        self.evict_over_capacity();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<(), CoreError> {
        if self.capacity == 0 {
            drop(f(None));
            return Ok(());
        }
        let stamp = self.stamp();
        // The entry guard holds the shard lock for the key, making the
        // callback atomic against concurrent operations on this key.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().entry.clone();
                match f(Some(current)) {
                    Some(replacement) => {
                        occupied.insert(Stored::new(replacement, stamp));
                    }
                    None => {
                        occupied.remove();
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if let Some(fresh) = f(None) {
                    vacant.insert(Stored::new(fresh, stamp));
                }
            }
        }
        self.evict_over_capacity();
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.entries.clear();
        Ok(())
    }

    async fn entry_count(&self) -> Result<usize, CoreError> {
        Ok(self.entries.len())
    }
}

//! In-process LRU store.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use lru::LruCache;
use tracing::debug;

use crate::error::CacheError;
use crate::key::PipelineCacheKey;
use crate::lock::{rw_read, rw_write};
use crate::response::CachedResponse;
use crate::store::CacheStore;

/// Entries keyed by the composite key itself, evicted least recently used
/// first once `capacity` is reached.
pub struct MemoryStore {
    entries: RwLock<LruCache<PipelineCacheKey, CachedResponse>>,
}

impl MemoryStore {
    /// Creates a store holding at most `capacity` entries (clamped to 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, "len").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if an entry exists under `key`, without touching its
    /// recency.
    pub fn contains(&self, key: &PipelineCacheKey) -> bool {
        rw_read(&self.entries, "contains").contains(key)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &PipelineCacheKey) -> Option<CachedResponse> {
        rw_write(&self.entries, "get").get(key).cloned()
    }

    fn store(&self, key: &PipelineCacheKey, response: CachedResponse) -> Result<(), CacheError> {
        let evicted = rw_write(&self.entries, "store").push(key.clone(), response);
        if let Some((evicted_key, _)) = evicted.filter(|(k, _)| k != key) {
            debug!(evicted = %evicted_key, "memory store evicted entry");
        }
        Ok(())
    }

    fn remove(&self, key: &PipelineCacheKey) {
        rw_write(&self.entries, "remove").pop(key);
    }

    fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, "clear").clear();
        Ok(())
    }
}

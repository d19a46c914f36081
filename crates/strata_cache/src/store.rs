//! The store contract the pipeline controller relies on.

use std::sync::Arc;

use strata_config::{StoreConfig, StoreKind};
use tracing::debug;

use crate::error::CacheError;
use crate::file::FileStore;
use crate::key::PipelineCacheKey;
use crate::memory::MemoryStore;
use crate::response::CachedResponse;

/// A shared key/value map of cached entries.
///
/// Implementations must tolerate concurrent `get`/`store`/`remove` calls;
/// when a `remove` races a `store` for the same key, the last write wins.
/// Eviction and capacity are the store's concern.
pub trait CacheStore: Send + Sync {
    /// Returns the entry stored under `key`, if any.
    fn get(&self, key: &PipelineCacheKey) -> Option<CachedResponse>;

    /// Stores `response` under `key`, replacing any previous entry.
    fn store(&self, key: &PipelineCacheKey, response: CachedResponse) -> Result<(), CacheError>;

    /// Removes the entry stored under `key`, if any.
    fn remove(&self, key: &PipelineCacheKey);

    /// Removes every entry.
    fn clear(&self) -> Result<(), CacheError>;
}

/// Builds the store selected by the `[store]` configuration section.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    debug!(kind = ?config.kind, "opening cache store");
    let store: Arc<dyn CacheStore> = match config.kind {
        StoreKind::Memory => Arc::new(MemoryStore::with_capacity(config.capacity)),
        StoreKind::Disk => Arc::new(FileStore::open(&config.directory)?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyFragment, StageKind};
    use crate::validity::Validity;

    fn key() -> PipelineCacheKey {
        [KeyFragment::new(StageKind::Reader, "resource", "logo.svg", "v1")]
            .into_iter()
            .collect()
    }

    #[test]
    fn opens_memory_store_by_default() {
        let store = open_store(&StoreConfig::default()).unwrap();
        assert!(store.get(&key()).is_none());
        store
            .store(&key(), CachedResponse::new(vec![Validity::Nop], b"svg".to_vec()))
            .unwrap();
        assert_eq!(store.get(&key()).unwrap().response, b"svg");
    }

    #[test]
    fn opens_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            kind: StoreKind::Disk,
            directory: dir.path().join("cache"),
            ..StoreConfig::default()
        };
        let store = open_store(&config).unwrap();
        store
            .store(&key(), CachedResponse::new(vec![Validity::Nop], b"svg".to_vec()))
            .unwrap();
        assert!(dir.path().join("cache").join("entries").is_dir());
        store.remove(&key());
        assert!(store.get(&key()).is_none());
    }
}

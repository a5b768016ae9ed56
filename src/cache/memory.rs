//! In-process cache store.
//!
//! [`MemoryStore`] keeps values in moka's async-friendly LRU + TTL cache,
//! owned per instance. It is the default store: cheap, bounded, and gone
//! with the process. For entries that should survive restarts or be shared
//! between processes use [`DirectoryStore`](super::DirectoryStore) or your
//! own [`CacheStore`].

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;

use super::store::CacheStore;
use crate::Result;

/// Configuration for the in-memory store.
///
/// ```rust
/// # use mimir::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached entries. `None` keeps entries until evicted
    /// by capacity. Default: 1 hour.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keep entries until capacity eviction.
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }
}

/// Bounded in-memory [`CacheStore`].
pub struct MemoryStore {
    cache: Cache<String, Value>,
}

impl MemoryStore {
    /// Create a store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            cache: builder.build(),
        }
    }

    /// Number of entries currently held.
    ///
    /// moka updates its counters lazily; call [`sync`](Self::sync) first when
    /// an exact figure matters.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush moka's pending maintenance so `len` is exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.cache.insert(key.to_owned(), value).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

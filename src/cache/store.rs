//! The key-value capability the cache layer writes through.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// A pluggable key-value store for cached responses.
///
/// Values are arbitrary JSON (string, number, null, object, array). The
/// cache layer writes each key at most once per miss and never deletes;
/// expiry and eviction, if any, belong to the implementation.
///
/// Errors returned here never reach the caller of a cached operation: the
/// layer logs them and behaves as if there were no cache.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use mimir::cache::CacheStore;
/// use serde_json::Value;
///
/// /// A store that never remembers anything.
/// struct Forgetful;
///
/// #[async_trait]
/// impl CacheStore for Forgetful {
///     async fn get(&self, _key: &str) -> mimir::Result<Option<Value>> {
///         Ok(None)
///     }
///
///     async fn set(&self, _key: &str, _value: Value) -> mimir::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a value. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Store name for logging/debugging.
    fn name(&self) -> &str {
        "cache"
    }
}

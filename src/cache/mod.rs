//! Response caching.
//!
//! - [`CacheLayer`] is the invocation layer. It derives a [`CacheKey`] from a
//!   request, replays stored results on a hit, and on a miss runs the real
//!   call once and stores what it produced. Streams are captured by a
//!   pass-through recorder and written only when they finish cleanly.
//!
//! - [`CacheStore`] is the key-value capability the layer writes through.
//!   [`MemoryStore`] (bounded LRU + TTL, per process) and [`DirectoryStore`]
//!   (one JSON file per key) are provided; any other store plugs in through
//!   the trait.
//!
//! Cache faults never surface to callers. Read failures and unusable entries
//! degrade to a miss, write failures are dropped; each is logged at `warn`
//! and counted under [`telemetry::CACHE_ERRORS_TOTAL`](crate::telemetry::CACHE_ERRORS_TOTAL).

mod directory;
mod key;
mod layer;
mod memory;
mod record;
mod replay;
mod store;

pub use directory::DirectoryStore;
pub use key::{CacheKey, canonical_bytes, derive_key};
pub use layer::CacheLayer;
pub use memory::{CacheConfig, MemoryStore};
pub use replay::ReplayPacing;
pub use store::CacheStore;

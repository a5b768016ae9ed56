//! The cache-augmented invocation layer.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::record::RecordingStream;
use super::replay::{self, ReplayPacing};
use super::store::CacheStore;
use crate::Result;
use crate::telemetry::{self, OP_GENERATE, OP_STREAM};
use crate::types::{GenerateResult, InvocationRequest, RawCall, StreamResponse};

/// Makes model calls replayable for identical inputs.
///
/// Each call is keyed by [`derive_key`](super::derive_key) of its request.
/// A hit is rebuilt from the store without touching the backend; a miss runs
/// the supplied operation exactly once and stores what it produced.
///
/// Only backend failures are ever returned. A store that cannot be read, an
/// entry that cannot be rebuilt, or a write that fails is logged and counted,
/// and the call proceeds as if there were no cache.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use mimir::cache::{CacheLayer, MemoryStore};
/// # use mimir::types::{GenerateResult, InvocationRequest};
/// # async fn example() -> mimir::Result<()> {
/// let layer = CacheLayer::new(Arc::new(MemoryStore::default()));
/// let request = InvocationRequest::new("m1", &serde_json::json!({"prompt": "hi"}))?;
///
/// let result = layer
///     .generate_with(&request, || async { Ok(GenerateResult::new("hello")) })
///     .await?;
/// assert_eq!(result.text, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    pacing: ReplayPacing,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("store", &self.store.name())
            .field("pacing", &self.pacing)
            .finish()
    }
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            pacing: ReplayPacing::default(),
        }
    }

    /// Override replay pacing for streamed hits.
    pub fn with_pacing(mut self, pacing: ReplayPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn pacing(&self) -> ReplayPacing {
        self.pacing
    }

    /// Single-shot call through the cache.
    ///
    /// On a miss `generate` is awaited once; its error, if any, is returned
    /// unchanged and nothing is stored.
    pub async fn generate_with<F, Fut>(
        &self,
        request: &InvocationRequest,
        generate: F,
    ) -> Result<GenerateResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GenerateResult>>,
    {
        let key = request.key();

        if let Some(stored) = self.lookup(&key, OP_GENERATE).await {
            match replay::rehydrate_generate(stored) {
                Ok(result) => {
                    self.record_hit(&key, OP_GENERATE);
                    return Ok(result);
                }
                Err(e) => self.record_replay_failure(&key, OP_GENERATE, &e),
            }
        }

        self.record_miss(&key, OP_GENERATE);
        let result = generate().await?;

        match serde_json::to_value(&result) {
            Ok(value) => self.write(&key, OP_GENERATE, value).await,
            Err(e) => self.record_write_failure(&key, OP_GENERATE, &e),
        }
        Ok(result)
    }

    /// Streaming call through the cache.
    ///
    /// A hit replays the stored frames with this layer's pacing and an empty
    /// [`RawCall`]. A miss awaits `stream` once and returns its response with
    /// the stream wrapped in a recorder; the frames are stored only if the
    /// consumer drains the stream to its end and no error was seen on the way.
    pub async fn stream_with<F, Fut>(
        &self,
        request: &InvocationRequest,
        stream: F,
    ) -> Result<StreamResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StreamResponse>>,
    {
        let key = request.key();

        if let Some(stored) = self.lookup(&key, OP_STREAM).await {
            match replay::rehydrate_frames(stored) {
                Ok(frames) => {
                    self.record_hit(&key, OP_STREAM);
                    debug!(key = %key, frames = frames.len(), "replaying cached stream");
                    return Ok(StreamResponse::new(
                        replay::replay_stream(frames, self.pacing),
                        RawCall::default(),
                    ));
                }
                Err(e) => self.record_replay_failure(&key, OP_STREAM, &e),
            }
        }

        self.record_miss(&key, OP_STREAM);
        let live = stream().await?;

        let recorder = RecordingStream::new(live.stream, key, self.store.clone());
        Ok(StreamResponse::new(Box::pin(recorder), live.raw_call))
    }

    /// Read an entry, degrading every store failure to a miss.
    async fn lookup(&self, key: &CacheKey, operation: &'static str) -> Option<Value> {
        match self.store.get(key.as_str()).await {
            Ok(found) => found,
            Err(e) => {
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
                    "operation" => operation,
                    "kind" => "read",
                )
                .increment(1);
                warn!(key = %key, store = self.store.name(), error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write(&self, key: &CacheKey, operation: &'static str, value: Value) {
        match self.store.set(key.as_str(), value).await {
            Ok(()) => {
                metrics::counter!(telemetry::CACHE_WRITES_TOTAL, "operation" => operation)
                    .increment(1);
                debug!(key = %key, store = self.store.name(), "cached response");
            }
            Err(e) => self.record_write_failure(key, operation, &e),
        }
    }

    fn record_hit(&self, key: &CacheKey, operation: &'static str) {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => operation).increment(1);
        debug!(key = %key, operation, "cache hit");
    }

    fn record_miss(&self, key: &CacheKey, operation: &'static str) {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation).increment(1);
        debug!(key = %key, operation, "cache miss");
    }

    fn record_replay_failure(
        &self,
        key: &CacheKey,
        operation: &'static str,
        error: &dyn std::fmt::Display,
    ) {
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
            "operation" => operation,
            "kind" => "replay",
        )
        .increment(1);
        warn!(key = %key, operation, error = %error, "cached entry unusable, calling backend");
    }

    fn record_write_failure(
        &self,
        key: &CacheKey,
        operation: &'static str,
        error: &dyn std::fmt::Display,
    ) {
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
            "operation" => operation,
            "kind" => "write",
        )
        .increment(1);
        warn!(key = %key, store = self.store.name(), error = %error, "cache write failed");
    }
}

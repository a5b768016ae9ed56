//! Pass-through relay that captures a live stream for the cache.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::CacheStore;
use crate::Result;
use crate::telemetry;
use crate::types::StreamPart;

type Flush = Pin<Box<dyn Future<Output = ()> + Send>>;

enum State {
    /// Forwarding and buffering.
    Relaying,
    /// Upstream ended cleanly; writing the buffer before reporting the end.
    Flushing(Flush),
    /// Upstream yielded an error or an error frame; forward whatever follows,
    /// record nothing.
    Poisoned,
    Done,
}

pin_project! {
    /// Forwards every item of `inner` unchanged while keeping a copy of each
    /// frame. When `inner` ends without having produced an error, the copies
    /// are written to the store under `key`, and only then does this stream
    /// end.
    ///
    /// Dropping the relay before the end discards the buffer: an incomplete
    /// stream is never cached.
    pub(crate) struct RecordingStream<S> {
        #[pin]
        inner: S,
        frames: Vec<StreamPart>,
        state: State,
        key: CacheKey,
        store: Arc<dyn CacheStore>,
    }
}

impl<S> RecordingStream<S> {
    pub(crate) fn new(inner: S, key: CacheKey, store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner,
            frames: Vec::new(),
            state: State::Relaying,
            key,
            store,
        }
    }
}

impl<S> Stream for RecordingStream<S>
where
    S: Stream<Item = Result<StreamPart>>,
{
    type Item = Result<StreamPart>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.state {
                State::Relaying => match ready!(this.inner.as_mut().poll_next(cx)) {
                    Some(Ok(part @ StreamPart::Error { .. })) => {
                        debug!(key = %this.key, "live stream reported an error, not caching");
                        this.frames.clear();
                        *this.state = State::Poisoned;
                        return Poll::Ready(Some(Ok(part)));
                    }
                    Some(Ok(part)) => {
                        this.frames.push(part.clone());
                        return Poll::Ready(Some(Ok(part)));
                    }
                    Some(Err(e)) => {
                        debug!(key = %this.key, error = %e, "live stream failed, not caching");
                        this.frames.clear();
                        *this.state = State::Poisoned;
                        return Poll::Ready(Some(Err(e)));
                    }
                    None => {
                        let frames = std::mem::take(this.frames);
                        *this.state = State::Flushing(Box::pin(write_frames(
                            this.store.clone(),
                            this.key.clone(),
                            frames,
                        )));
                    }
                },
                State::Flushing(flush) => {
                    ready!(flush.as_mut().poll(cx));
                    *this.state = State::Done;
                }
                State::Poisoned => {
                    let item = ready!(this.inner.as_mut().poll_next(cx));
                    if item.is_none() {
                        *this.state = State::Done;
                    }
                    return Poll::Ready(item);
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Best-effort write of a captured stream. Failures are logged, never raised:
/// by now the consumer already has every frame.
async fn write_frames(store: Arc<dyn CacheStore>, key: CacheKey, frames: Vec<StreamPart>) {
    let count = frames.len();
    let value = match serde_json::to_value(&frames) {
        Ok(value) => value,
        Err(e) => {
            record_write_failure(&key, store.name(), &e);
            return;
        }
    };
    match store.set(key.as_str(), value).await {
        Ok(()) => {
            metrics::counter!(telemetry::CACHE_WRITES_TOTAL, "operation" => telemetry::OP_STREAM)
                .increment(1);
            debug!(key = %key, store = store.name(), frames = count, "cached stream");
        }
        Err(e) => record_write_failure(&key, store.name(), &e),
    }
}

fn record_write_failure(key: &CacheKey, store: &str, error: &dyn std::fmt::Display) {
    metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
        "operation" => telemetry::OP_STREAM,
        "kind" => "write",
    )
    .increment(1);
    warn!(key = %key, store, error = %error, "failed to cache stream");
}

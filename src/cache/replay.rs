//! Rebuilding responses from stored JSON.

use std::time::Duration;

use futures_util::stream;
use serde_json::Value;

use crate::types::{EventStream, GenerateResult, StreamPart};
use crate::{MimirError, Result};

/// Pacing of a replayed stream.
///
/// Replays are not required to mimic live timing; a small per-chunk delay
/// only keeps UIs that animate incoming text looking natural.
/// Default: no initial delay, 10ms between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPacing {
    /// Delay before the first frame.
    pub initial_delay: Duration,
    /// Delay before each subsequent frame.
    pub chunk_delay: Duration,
}

impl Default for ReplayPacing {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            chunk_delay: Duration::from_millis(10),
        }
    }
}

impl ReplayPacing {
    /// Emit every frame as fast as the consumer polls.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

/// Turn a stored single-shot value back into a result, timestamps included.
pub(crate) fn rehydrate_generate(stored: Value) -> Result<GenerateResult> {
    serde_json::from_value(stored).map_err(|e| MimirError::Replay(e.to_string()))
}

/// Turn a stored frame list back into parts.
///
/// All-or-nothing: one bad frame rejects the whole entry, so a replay is
/// never cut short halfway through.
pub(crate) fn rehydrate_frames(stored: Value) -> Result<Vec<StreamPart>> {
    let Value::Array(frames) = stored else {
        return Err(MimirError::Replay(format!(
            "expected an array of frames, found {}",
            json_kind(&stored)
        )));
    };
    frames
        .into_iter()
        .enumerate()
        .map(|(i, frame)| {
            serde_json::from_value(frame).map_err(|e| MimirError::Replay(format!("frame {i}: {e}")))
        })
        .collect()
}

/// A synthetic stream that emits `frames` in order with the given pacing.
pub(crate) fn replay_stream(frames: Vec<StreamPart>, pacing: ReplayPacing) -> EventStream {
    let frames = frames.into_iter();
    Box::pin(stream::unfold(
        (frames, 0usize),
        move |(mut frames, emitted)| async move {
            let part = frames.next()?;
            let delay = if emitted == 0 {
                pacing.initial_delay
            } else {
                pacing.chunk_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((Ok(part), (frames, emitted + 1)))
        },
    ))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

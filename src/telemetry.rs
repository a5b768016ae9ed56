//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: call being cached or dispatched: "generate" or "stream"
//! - `provider`: backend provider name (e.g. "openai")
//! - `status`: outcome: "ok" or "error"
//! - `kind`: cache fault kind: "read", "write" or "replay"

/// Total cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total cache misses, including reads that degraded to a miss.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Total successful cache writes.
///
/// Labels: `operation`.
pub const CACHE_WRITES_TOTAL: &str = "mimir_cache_writes_total";

/// Total cache faults that were logged and swallowed.
///
/// Labels: `operation`, `kind` ("read" | "write" | "replay").
pub const CACHE_ERRORS_TOTAL: &str = "mimir_cache_errors_total";

/// Total requests sent to a real backend.
///
/// Labels: `provider`, `operation`, `status` ("ok" | "error").
pub const BACKEND_REQUESTS_TOTAL: &str = "mimir_backend_requests_total";

/// Backend request duration in seconds (time to response or first byte).
///
/// Labels: `provider`, `operation`.
pub const BACKEND_REQUEST_DURATION_SECONDS: &str = "mimir_backend_request_duration_seconds";

pub(crate) const OP_GENERATE: &str = "generate";
pub(crate) const OP_STREAM: &str = "stream";

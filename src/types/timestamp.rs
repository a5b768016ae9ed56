//! Timestamp re-hydration for stored responses.
//!
//! Cached values are plain JSON, so a timestamp comes back as whatever scalar
//! the writer produced. chrono writes RFC 3339 strings; other writers (or
//! older entries) may hold epoch milliseconds. Both are accepted and turned
//! back into a [`DateTime<Utc>`].

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Convert a stored scalar back into a UTC datetime.
///
/// Accepts an RFC 3339 string, an integer of epoch milliseconds, or a float
/// of epoch milliseconds (sub-millisecond precision is kept to the
/// microsecond).
pub fn rehydrate(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp {s:?}: {e}")),
        Value::Number(n) => {
            let parsed = if let Some(ms) = n.as_i64() {
                DateTime::from_timestamp_millis(ms)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .and_then(|f| DateTime::from_timestamp_micros((f * 1000.0).round() as i64))
            };
            parsed.ok_or_else(|| format!("timestamp out of range: {n}"))
        }
        other => Err(format!("unsupported timestamp form: {other}")),
    }
}

/// `deserialize_with` helper for optional timestamp fields.
pub(crate) fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => rehydrate(&raw).map(Some).map_err(D::Error::custom),
    }
}

//! The unit of work the cache layer keys on

use serde::{Deserialize, Serialize};

use crate::Result;

/// A model identifier paired with the full parameter set of one call.
///
/// Params are held as a JSON value so any serialisable parameter type can be
/// keyed. Construction is where non-serialisable input is rejected; once a
/// request exists its key can always be derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub model: String,
    pub params: serde_json::Value,
}

impl InvocationRequest {
    /// Build a request from a model id and any serialisable params.
    ///
    /// Fails with [`MimirError::Json`](crate::MimirError::Json) when `params`
    /// cannot be represented as JSON (e.g. a map with non-string keys).
    pub fn new(model: impl Into<String>, params: &impl Serialize) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            params: serde_json::to_value(params)?,
        })
    }

    /// Build a request from params that are already a JSON value.
    pub fn from_value(model: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            model: model.into(),
            params,
        }
    }

    /// Derive the cache key for this request.
    pub fn key(&self) -> crate::cache::CacheKey {
        crate::cache::derive_key(self)
    }
}

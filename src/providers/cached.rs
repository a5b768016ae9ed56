//! Caching decorator for any backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::traits::ModelBackend;
use crate::Result;
use crate::cache::CacheLayer;
use crate::telemetry;
use crate::types::{CallParams, GenerateResult, InvocationRequest, StreamResponse};

/// A [`ModelBackend`] that answers repeated calls from a [`CacheLayer`].
///
/// The request identity is the inner backend's
/// [`qualified_id`](ModelBackend::qualified_id) together with the full
/// [`CallParams`] and the operation (`"generate"` or `"stream"`). The two
/// operations store different shapes, so they never share an entry.
/// Provider name and model id are forwarded, so code holding an
/// `Arc<dyn ModelBackend>` cannot tell the two apart.
pub struct CachedBackend {
    inner: Arc<dyn ModelBackend>,
    layer: CacheLayer,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, layer: CacheLayer) -> Self {
        Self { inner, layer }
    }

    pub fn inner(&self) -> &Arc<dyn ModelBackend> {
        &self.inner
    }

    pub fn layer(&self) -> &CacheLayer {
        &self.layer
    }

    fn request(&self, operation: &str, params: &CallParams) -> Result<InvocationRequest> {
        let params = serde_json::to_value(params)?;
        Ok(InvocationRequest::from_value(
            self.inner.qualified_id(),
            json!({ "operation": operation, "params": params }),
        ))
    }
}

#[async_trait]
impl ModelBackend for CachedBackend {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn qualified_id(&self) -> String {
        self.inner.qualified_id()
    }

    async fn generate(&self, params: &CallParams) -> Result<GenerateResult> {
        let request = self.request(telemetry::OP_GENERATE, params)?;
        self.layer
            .generate_with(&request, || self.inner.generate(params))
            .await
    }

    async fn stream(&self, params: &CallParams) -> Result<StreamResponse> {
        let request = self.request(telemetry::OP_STREAM, params)?;
        self.layer
            .stream_with(&request, || self.inner.stream(params))
            .await
    }
}

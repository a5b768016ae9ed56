//! Mimir error types

use std::time::Duration;

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),

    // Cache errors. Never surfaced by the cache layer itself; stores return
    // them and the layer degrades to a miss.
    #[error("cache store error: {0}")]
    Store(String),

    #[error("cached entry could not be replayed: {0}")]
    Replay(String),

    // Soft errors
    #[error("empty response from model")]
    EmptyResponse,

    // Invoice errors
    #[error("invoice extraction failed: {0}")]
    Extraction(String),

    #[error("duplicate invoice: {vendor} #{number} ({amount})")]
    DuplicateInvoice {
        vendor: String,
        number: String,
        amount: String,
    },

    #[error("invoice not found: {0}")]
    InvoiceNotFound(String),
}

impl MimirError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Rate limits, transport failures and 5xx responses are transient.
    /// Everything else (auth, bad input, unknown model, cache faults) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            MimirError::RateLimited { .. } | MimirError::Http(_) => true,
            MimirError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The provider's `Retry-After` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MimirError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MimirError {
    fn from(err: reqwest::Error) -> Self {
        MimirError::Http(err.to_string())
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;

use std::time::Duration;

use mimir::{MimirError, Result};

#[test]
fn test_error_display() {
    let err = MimirError::ModelNotFound("gpt-5".to_string());
    assert!(err.to_string().contains("gpt-5"));

    let err = MimirError::Api {
        status: 418,
        message: "teapot".into(),
    };
    assert_eq!(err.to_string(), "API error (418): teapot");
}

#[test]
fn test_duplicate_invoice_display() {
    let err = MimirError::DuplicateInvoice {
        vendor: "Acme Corp".into(),
        number: "INV-001".into(),
        amount: "1250.00".into(),
    };
    assert_eq!(
        err.to_string(),
        "duplicate invoice: Acme Corp #INV-001 (1250.00)"
    );
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MimirError::NoProvider)
    }
    assert!(returns_error().is_err());
}

#[test]
fn test_json_error_converts() {
    fn parse() -> Result<serde_json::Value> {
        Ok(serde_json::from_str("{nope")?)
    }
    assert!(matches!(parse(), Err(MimirError::Json(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MimirError::RateLimited { retry_after: None }.is_transient());
    assert!(MimirError::Http("connection reset".into()).is_transient());
    for status in [500, 502, 503, 504] {
        assert!(
            MimirError::Api {
                status,
                message: "upstream".into()
            }
            .is_transient(),
            "{status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!MimirError::AuthenticationFailed.is_transient());
    assert!(!MimirError::ModelNotFound("x".into()).is_transient());
    assert!(!MimirError::InvalidInput("x".into()).is_transient());
    assert!(!MimirError::NoProvider.is_transient());
    assert!(!MimirError::Configuration("x".into()).is_transient());
    assert!(
        !MimirError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient()
    );
    assert!(!MimirError::Store("x".into()).is_transient());
    assert!(!MimirError::Replay("x".into()).is_transient());
    assert!(!MimirError::Extraction("x".into()).is_transient());
}

// ============================================================================
// Retry-After
// ============================================================================

#[test]
fn retry_after_only_on_rate_limit() {
    let err = MimirError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    assert_eq!(
        MimirError::RateLimited { retry_after: None }.retry_after(),
        None
    );
    assert_eq!(MimirError::Http("x".into()).retry_after(), None);
}

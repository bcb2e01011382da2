// Error classification tests: outcome kinds and HTTP status mapping

use kagami::error::{GatewayError, Outcome};

#[test]
fn test_client_faults() {
    for err in [
        GatewayError::InvalidPath("bad".into()),
        GatewayError::Signature,
        GatewayError::UnsupportedParameter("blur".into()),
    ] {
        assert_eq!(err.outcome(), Outcome::ClientFault, "{err}");
    }
}

#[test]
fn test_status_mapping() {
    let cases = [
        (GatewayError::InvalidPath("bad".into()), 400),
        (GatewayError::UnsupportedParameter("blur".into()), 400),
        (GatewayError::Signature, 403),
        (GatewayError::NotFound("a.jpg".into()), 404),
        (GatewayError::SizeExceeded { size: 2, limit: 1 }, 502),
        (GatewayError::Forbidden("host".into()), 502),
        (GatewayError::upstream("s3", "boom"), 502),
        (GatewayError::Overloaded { limit: 8 }, 503),
        (GatewayError::Timeout { after_ms: 5 }, 504),
    ];
    for (err, status) in cases {
        assert_eq!(err.status(), status, "{err}");
    }
}

#[test]
fn test_outcome_labels() {
    assert_eq!(Outcome::Served.as_str(), "served");
    assert_eq!(Outcome::Served.status(), 200);
    assert_eq!(Outcome::UpstreamFault.as_str(), "upstream_fault");
    assert_eq!(Outcome::Timeout.as_str(), "timeout");
}

#[test]
fn test_error_messages_name_the_backend() {
    let err = GatewayError::upstream("http", "connection reset");
    assert_eq!(err.to_string(), "http failed: connection reset");
}

#[test]
fn test_errors_are_cloneable_for_broadcast() {
    let err = GatewayError::NotFound("a.jpg".into());
    let copies: Vec<GatewayError> = (0..3).map(|_| err.clone()).collect();
    assert!(copies.iter().all(|e| *e == err));
}

//! Response generators for the front end.
//!
//! Functions return `EndpointResponse` instead of writing directly to the
//! session, which keeps response generation testable. The caller writes
//! the response to the session.

use std::time::Instant;

use bytes::Bytes;

use crate::blob::Blob;
use crate::error::GatewayError;

/// Response from a handler
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl EndpointResponse {
    /// Create a JSON response with the given status and body.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: Bytes::from(body.to_string()),
        }
    }

    /// 200 response carrying processed bytes
    pub fn image(blob: Blob) -> Self {
        let (body, content_type) = blob.into_parts();
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    /// JSON `{error, message, status}` for an engine failure
    pub fn error(err: &GatewayError) -> Self {
        Self::failure(err.status(), &err.to_string())
    }

    pub fn failure(status: u16, message: &str) -> Self {
        Self::json(
            status,
            serde_json::json!({
                "error": reason(status),
                "message": message,
                "status": status
            }),
        )
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        502 => "Bad Gateway",
        503 => "Service Temporarily Unavailable",
        504 => "Gateway Timeout",
        _ => "Internal Server Error",
    }
}

/// Generate response for the healthcheck endpoint.
pub fn handle_health(start_time: Instant, in_flight: usize) -> EndpointResponse {
    EndpointResponse::json(
        200,
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": start_time.elapsed().as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
            "in_flight": in_flight
        }),
    )
}

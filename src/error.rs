// Error types module
//
// `GatewayError` is the only error type that crosses from the engine into
// the front end. Backend-local errors (`LoaderError`, `ProcessorError`, ...)
// are folded into it by the resolver and the processor chain.

use thiserror::Error;

/// Terminal state of a request, as seen by the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Transformed bytes were returned
    Served,
    /// Malformed path, bad signature or unsupported parameter
    ClientFault,
    /// No loader could find the source image
    NotFound,
    /// Loader or processor failure
    UpstreamFault,
    /// Fetch + transform exceeded the request timeout
    Timeout,
    /// Too many distinct requests in flight
    Overloaded,
}

impl Outcome {
    /// HTTP status the transport layer should answer with
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Served => 200,
            Outcome::ClientFault => 400,
            Outcome::NotFound => 404,
            Outcome::UpstreamFault => 502,
            Outcome::Timeout => 504,
            Outcome::Overloaded => 503,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Served => "served",
            Outcome::ClientFault => "client_fault",
            Outcome::NotFound => "not_found",
            Outcome::UpstreamFault => "upstream_fault",
            Outcome::Timeout => "timeout",
            Outcome::Overloaded => "overloaded",
        }
    }
}

/// Errors returned by `Engine::process`
///
/// Cloneable so a leader's failure can be broadcast verbatim to every
/// coalesced follower.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request path could not be parsed
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Signature missing, malformed or not matching
    #[error("invalid or missing URL signature")]
    Signature,

    /// A requested operation is disabled or unknown
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// The source image does not exist in any loader
    #[error("image not found: {0}")]
    NotFound(String),

    /// A loader refused the source because it is too large
    #[error("source size {size} bytes exceeds limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    /// A loader refused access to the source
    #[error("source access denied: {0}")]
    Forbidden(String),

    /// A loader or processor failed
    #[error("{backend} failed: {message}")]
    Upstream { backend: String, message: String },

    /// Fetch + transform did not finish in time
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The coalescer refused to start another distinct request
    #[error("too many requests in flight (limit {limit})")]
    Overloaded { limit: usize },
}

impl GatewayError {
    pub fn upstream(backend: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Upstream {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a terminal outcome
    pub fn outcome(&self) -> Outcome {
        match self {
            GatewayError::InvalidPath(_)
            | GatewayError::Signature
            | GatewayError::UnsupportedParameter(_) => Outcome::ClientFault,
            GatewayError::NotFound(_) => Outcome::NotFound,
            GatewayError::SizeExceeded { .. }
            | GatewayError::Forbidden(_)
            | GatewayError::Upstream { .. } => Outcome::UpstreamFault,
            GatewayError::Timeout { .. } => Outcome::Timeout,
            GatewayError::Overloaded { .. } => Outcome::Overloaded,
        }
    }

    /// HTTP status for this error
    ///
    /// Signature failures are the only client faults answered with 403.
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Signature => 403,
            other => other.outcome().status(),
        }
    }
}

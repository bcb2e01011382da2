//! Proxy utility functions.
//!
//! Pure helpers for turning a Pingora request into an engine path:
//! - path prefix stripping
//! - percent-decoding
//! - client IP detection (X-Forwarded-For aware)

use std::borrow::Cow;

use pingora_proxy::Session;

use crate::constants::HEALTHCHECK_PATH;

/// What the front end should do with a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Healthcheck,
    /// Decoded path to hand to the engine
    Process(String),
    /// Path outside the configured prefix, or not valid UTF-8 once decoded
    NotFound,
}

/// Strip `prefix` from `path`, requiring a segment boundary.
///
/// An empty prefix matches everything.
pub fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Percent-decode a raw request path.
///
/// `+` is left alone; only `%XX` escapes are decoded.
pub fn decode_path(raw: &str) -> Option<Cow<'_, str>> {
    urlencoding::decode(raw).ok()
}

/// Decide how to serve a raw (still percent-encoded) request path
pub fn route(raw_path: &str, prefix: &str) -> Route {
    if raw_path == HEALTHCHECK_PATH {
        return Route::Healthcheck;
    }
    let Some(rest) = strip_path_prefix(raw_path, prefix) else {
        return Route::NotFound;
    };
    match decode_path(rest) {
        Some(decoded) => Route::Process(decoded.trim_start_matches('/').to_string()),
        None => Route::NotFound,
    }
}

/// Extract client IP address from session (X-Forwarded-For aware).
///
/// The header can contain multiple IPs: `"client, proxy1, proxy2"`.
/// The first IP is the original client, which is what we return.
pub fn get_client_ip(session: &Session) -> String {
    if let Some(forwarded_for) = session
        .req_header()
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(client_ip) = forwarded_for.split(',').next() {
            return client_ip.trim().to_string();
        }
    }

    session
        .client_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

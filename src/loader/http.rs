//! HTTP(S) source loader
//!
//! Keys with an explicit `http://` or `https://` scheme are fetched as-is.
//! Bare keys whose first segment looks like a host name
//! (`example.com/cat.jpg`) are fetched over https.
//!
//! # Allow-list
//!
//! `allowed_sources` holds host patterns (`images.example.com`,
//! `*.example.com`). When the list is non-empty:
//!
//! - a scheme key for a host outside the list is refused with
//!   [`LoaderError::Forbidden`];
//! - a bare key for a host outside the list is not handled at all, so other
//!   loaders (e.g. the file store) still get a chance at it.
//!
//! Redirects are followed only while every hop stays inside the list.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use super::{Loader, LoaderError};
use crate::blob::Blob;
use crate::config::HttpLoaderConfig;

const MAX_REDIRECTS: usize = 10;

/// Loader that fetches source images over HTTP
pub struct HttpLoader {
    client: reqwest::Client,
    allowed_sources: Vec<String>,
    max_allowed_size: u64,
}

impl HttpLoader {
    /// Create a loader from its configuration
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &HttpLoaderConfig) -> Result<Self, LoaderError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(redirect_policy(config.allowed_sources.clone()));
        if let Some(user_agent) = config.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|e| LoaderError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            allowed_sources: config.allowed_sources.clone(),
            max_allowed_size: config.max_allowed_size,
        })
    }

    /// Full URL for `key`, or None when the key is not an HTTP source
    fn url_for(key: &str) -> Option<String> {
        if has_scheme(key) {
            return Some(key.to_string());
        }
        let host = key.split('/').next()?;
        if host.contains('.') && key.len() > host.len() + 1 && !host.starts_with('.') {
            return Some(format!("https://{key}"));
        }
        None
    }

    fn is_allowed(&self, host: &str) -> bool {
        host_allowed(&self.allowed_sources, host)
    }

    fn check_size(&self, size: u64) -> Result<(), LoaderError> {
        if self.max_allowed_size > 0 && size > self.max_allowed_size {
            return Err(LoaderError::SizeExceeded {
                size,
                limit: self.max_allowed_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Loader for HttpLoader {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, key: &str) -> bool {
        if has_scheme(key) {
            return true;
        }
        Self::url_for(key)
            .as_deref()
            .and_then(host_of)
            .is_some_and(|host| self.is_allowed(host))
    }

    async fn fetch(&self, key: &str) -> Result<Blob, LoaderError> {
        let url = Self::url_for(key).ok_or(LoaderError::NotFound)?;
        let host = host_of(&url)
            .ok_or_else(|| LoaderError::Forbidden(format!("no host in source url: {url}")))?;
        if !self.is_allowed(host) {
            tracing::warn!(host = %host, "Source host not in allowed_sources");
            return Err(LoaderError::Forbidden(format!(
                "host {host} is not an allowed source"
            )));
        }

        let mut response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_redirect() {
                tracing::warn!(url = %url, error = %e, "Source redirect refused");
                LoaderError::Forbidden(format!("redirect refused: {e}"))
            } else {
                LoaderError::Transport(format!("HTTP fetch failed: {e}"))
            }
        })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(LoaderError::NotFound),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(LoaderError::Forbidden(format!(
                    "upstream answered {}",
                    response.status()
                )))
            }
            status => {
                return Err(LoaderError::Transport(format!(
                    "HTTP request failed with status: {status}"
                )))
            }
        }

        if let Some(length) = response.content_length() {
            self.check_size(length)?;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Content-Length may be absent (chunked) or wrong
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LoaderError::Transport(format!("failed to read HTTP body: {e}")))?
        {
            self.check_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched HTTP source");
        Ok(Blob::sniffed(bytes, content_type.as_deref()))
    }
}

fn host_allowed(allowed_sources: &[String], host: &str) -> bool {
    allowed_sources.is_empty()
        || allowed_sources
            .iter()
            .any(|pattern| glob_match(pattern, host))
}

/// Follow redirects only to allowed hosts
fn redirect_policy(allowed_sources: Vec<String>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let host = attempt.url().host_str().map(str::to_string);
        match host {
            Some(host) if host_allowed(&allowed_sources, &host) => attempt.follow(),
            Some(host) => attempt.error(format!("redirect to {host} is outside allowed_sources")),
            None => attempt.error("redirect without a host"),
        }
    })
}

fn has_scheme(key: &str) -> bool {
    key.starts_with("http://") || key.starts_with("https://")
}

/// Host part of an absolute http(s) URL, without port or credentials
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

/// Simple glob matching: `*`, `*suffix`, `prefix*` or exact
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    let pattern = pattern.to_ascii_lowercase();
    let text = text.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix('*') {
        return text.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return text.starts_with(prefix);
    }
    pattern == text
}

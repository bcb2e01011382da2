//! Source loaders
//!
//! A [`Loader`] fetches source image bytes for an image key. Loaders are
//! registered in order on a [`SourceResolver`], which tries each applicable
//! loader once, sequentially, and returns the first success.
//!
//! A loader that does not apply to a key (wrong scheme, wrong path prefix)
//! says so through [`Loader::can_handle`] and is skipped silently. An
//! applicable loader returns either the bytes or a definitive
//! [`LoaderError`].

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::blob::Blob;
use crate::error::GatewayError;

/// Definitive failure from an applicable loader
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    #[error("not found")]
    NotFound,

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("size {size} bytes exceeds limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Capability that fetches source image bytes
#[async_trait]
pub trait Loader: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Whether this loader applies to `key` at all
    fn can_handle(&self, key: &str) -> bool;

    /// Fetch the bytes for `key`
    async fn fetch(&self, key: &str) -> Result<Blob, LoaderError>;
}

/// Failure of a whole resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    /// Name of the loader whose error was selected
    pub loader: Option<String>,
    pub error: LoaderError,
}

impl ResolveError {
    /// Convert into the engine-level error for `key`
    pub fn into_gateway_error(self, key: &str) -> GatewayError {
        match self.error {
            LoaderError::NotFound => GatewayError::NotFound(key.to_string()),
            LoaderError::SizeExceeded { size, limit } => GatewayError::SizeExceeded { size, limit },
            LoaderError::Forbidden(message) => GatewayError::Forbidden(message),
            LoaderError::Transport(message) => GatewayError::upstream(
                self.loader.unwrap_or_else(|| "loader".to_string()),
                message,
            ),
        }
    }
}

/// Ordered list of loaders tried one after another
#[derive(Clone, Default)]
pub struct SourceResolver {
    loaders: Vec<Arc<dyn Loader>>,
}

impl SourceResolver {
    pub fn new(loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self { loaders }
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Fetch `key` from the first loader that succeeds.
    ///
    /// When every applicable loader fails the aggregate error is, in order
    /// of precedence: the first `SizeExceeded`; `NotFound` if any loader
    /// reported it or none applied; otherwise the first failure.
    pub async fn load(&self, key: &str) -> Result<Blob, ResolveError> {
        let mut size_exceeded: Option<ResolveError> = None;
        let mut not_found = false;
        let mut first_failure: Option<ResolveError> = None;

        for loader in &self.loaders {
            if !loader.can_handle(key) {
                continue;
            }

            match loader.fetch(key).await {
                Ok(blob) => {
                    tracing::debug!(
                        loader = loader.name(),
                        key = %key,
                        bytes = blob.len(),
                        content_type = blob.content_type(),
                        "Source loaded"
                    );
                    return Ok(blob);
                }
                Err(error) => {
                    tracing::debug!(
                        loader = loader.name(),
                        key = %key,
                        error = %error,
                        "Loader failed, trying next"
                    );
                    let failure = ResolveError {
                        loader: Some(loader.name().to_string()),
                        error,
                    };
                    if matches!(failure.error, LoaderError::NotFound) {
                        not_found = true;
                    } else if matches!(failure.error, LoaderError::SizeExceeded { .. }) {
                        size_exceeded.get_or_insert(failure);
                    } else {
                        first_failure.get_or_insert(failure);
                    }
                }
            }
        }

        if let Some(failure) = size_exceeded {
            return Err(failure);
        }
        if not_found {
            return Err(ResolveError {
                loader: None,
                error: LoaderError::NotFound,
            });
        }
        Err(first_failure.unwrap_or(ResolveError {
            loader: None,
            error: LoaderError::NotFound,
        }))
    }
}

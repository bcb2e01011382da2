//! Image processors
//!
//! A [`Processor`] turns source bytes plus [`Params`] into result bytes.
//! Processors are registered in order on a [`ProcessorChain`]:
//!
//! - `Ok` ends the chain (the content type may differ from the source);
//! - `Unsupported` hands the request to the next processor;
//! - `Fatal` aborts the request immediately (e.g. undecodable image).
//!
//! Filters a processor refuses to run are checked for every processor
//! before any of them runs, so a disabled filter is rejected even when a
//! later processor would have accepted it.

pub mod encoder;
pub mod image;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blob::Blob;
use crate::error::GatewayError;
use crate::params::Params;

/// Content type of meta results
pub const META_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// This processor cannot handle the input; try the next one
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The request uses a filter that is disabled
    #[error("filter disabled: {0}")]
    Disabled(String),

    /// Processing failed and must not be retried elsewhere
    #[error("{0}")]
    Fatal(String),
}

impl From<ProcessorError> for GatewayError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::Disabled(name) => GatewayError::UnsupportedParameter(name),
            ProcessorError::Unsupported(message) | ProcessorError::Fatal(message) => {
                GatewayError::upstream("processor", message)
            }
        }
    }
}

/// Result of a meta request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub format: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    /// EXIF orientation (1-8) when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u16>,
    /// Source size in bytes
    pub bytes: usize,
}

/// Capability that transforms source bytes
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether this processor refuses to run `filter`
    fn rejects(&self, _filter: &str) -> bool {
        false
    }

    /// Apply `params` to `blob`
    async fn process(&self, blob: &Blob, params: &Params) -> Result<Blob, ProcessorError>;

    /// Describe `blob` without transforming it
    async fn process_meta(&self, blob: &Blob) -> Result<Metadata, ProcessorError>;
}

/// Ordered list of processors tried one after another
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self { processors }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Name of the first disabled filter used by `params`, if any
    pub fn disabled_filter<'a>(&self, params: &'a Params) -> Option<&'a str> {
        params
            .filters
            .iter()
            .map(|f| f.name.as_str())
            .find(|name| self.processors.iter().any(|p| p.rejects(name)))
    }

    /// Run the chain over `blob`. An empty chain returns the source as-is.
    pub async fn apply(&self, blob: Blob, params: &Params) -> Result<Blob, ProcessorError> {
        if let Some(name) = self.disabled_filter(params) {
            return Err(ProcessorError::Disabled(name.to_string()));
        }

        if self.processors.is_empty() {
            return Ok(blob);
        }

        let mut last_unsupported = None;
        for processor in &self.processors {
            let result = if params.meta {
                processor.process_meta(&blob).await.and_then(|meta| {
                    serde_json::to_vec(&meta)
                        .map(|json| Blob::new(json, META_CONTENT_TYPE))
                        .map_err(|e| ProcessorError::Fatal(e.to_string()))
                })
            } else {
                processor.process(&blob, params).await
            };

            match result {
                Ok(output) => {
                    tracing::debug!(
                        processor = processor.name(),
                        bytes = output.len(),
                        content_type = output.content_type(),
                        "Processed"
                    );
                    return Ok(output);
                }
                Err(ProcessorError::Unsupported(reason)) => {
                    tracing::debug!(
                        processor = processor.name(),
                        reason = %reason,
                        "Processor unsupported, trying next"
                    );
                    last_unsupported = Some(reason);
                }
                Err(e) => {
                    tracing::warn!(processor = processor.name(), error = %e, "Processing failed");
                    return Err(e);
                }
            }
        }

        Err(ProcessorError::Unsupported(format!(
            "no processor could handle {}: {}",
            blob.content_type(),
            last_unsupported.unwrap_or_default()
        )))
    }
}

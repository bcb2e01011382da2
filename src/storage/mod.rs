//! Result storages
//!
//! A [`Storage`] persists transformed results. The [`ResultWriter`] fans a
//! result out to every applicable storage concurrently. Storage failures are
//! never fatal to a request: the engine runs the writer detached from the
//! response and only logs what went wrong.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;

use crate::blob::Blob;

/// Failure to persist a result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

/// Capability that persists transformed results
#[async_trait]
pub trait Storage: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether this storage accepts `key` at all
    fn can_handle(&self, _key: &str) -> bool {
        true
    }

    /// Store `blob` under `key`, overwriting any previous value
    async fn put(&self, key: &str, blob: &Blob) -> Result<(), StorageError>;
}

/// Path-safe key a result is stored under.
///
/// Runs of slashes collapse to one, so a source URL in the fingerprint
/// (`100x100/https://example.com/cat.jpg`) becomes nested directories
/// (`100x100/https:/example.com/cat.jpg`).
pub fn storage_key(fingerprint: &str) -> String {
    fingerprint
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Outcome of one storage in a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub storage: String,
    pub result: Result<(), StorageError>,
}

/// Fan-out writer over an immutable list of storages
#[derive(Clone, Default)]
pub struct ResultWriter {
    storages: Vec<Arc<dyn Storage>>,
}

impl ResultWriter {
    pub fn new(storages: Vec<Arc<dyn Storage>>) -> Self {
        Self { storages }
    }

    pub fn len(&self) -> usize {
        self.storages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }

    /// Write `blob` to every applicable storage concurrently.
    ///
    /// One storage failing does not stop the others. Each failure is logged
    /// and reported back.
    pub async fn save(&self, key: &str, blob: &Blob) -> Vec<SaveReport> {
        let writes = self
            .storages
            .iter()
            .filter(|storage| storage.can_handle(key))
            .map(|storage| async move {
                let result = storage.put(key, blob).await;
                match &result {
                    Ok(()) => tracing::debug!(
                        storage = storage.name(),
                        key = %key,
                        bytes = blob.len(),
                        "Result stored"
                    ),
                    Err(e) => tracing::warn!(
                        storage = storage.name(),
                        key = %key,
                        error = %e,
                        "PersistenceFault: failed to store result"
                    ),
                }
                SaveReport {
                    storage: storage.name().to_string(),
                    result,
                }
            });

        join_all(writes).await
    }
}

//! Filesystem store

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{sanitize, strip_prefix};
use crate::blob::Blob;
use crate::config::FileStoreConfig;
use crate::loader::{Loader, LoaderError};
use crate::storage::{Storage, StorageError};

/// Loader + storage rooted at a directory
pub struct FileStore {
    base_dir: PathBuf,
    path_prefix: String,
    max_allowed_size: u64,
}

impl FileStore {
    pub fn new(config: &FileStoreConfig) -> Self {
        Self {
            base_dir: PathBuf::from(&config.base_dir),
            path_prefix: config.path_prefix.clone(),
            max_allowed_size: config.max_allowed_size,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a key to a path under `base_dir`
    fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        let relative = strip_prefix(key, &self.path_prefix).unwrap_or(key);
        let relative = sanitize(relative.trim_start_matches('/'))?;
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl Loader for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, key: &str) -> bool {
        strip_prefix(key, &self.path_prefix).is_some_and(|rest| !rest.is_empty())
    }

    async fn fetch(&self, key: &str) -> Result<Blob, LoaderError> {
        let path = self.path_for(key).map_err(LoaderError::Forbidden)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoaderError::NotFound)
            }
            Err(e) => return Err(LoaderError::Transport(e.to_string())),
        };
        if !metadata.is_file() {
            return Err(LoaderError::NotFound);
        }
        if self.max_allowed_size > 0 && metadata.len() > self.max_allowed_size {
            return Err(LoaderError::SizeExceeded {
                size: metadata.len(),
                limit: self.max_allowed_size,
            });
        }

        let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoaderError::NotFound,
            std::io::ErrorKind::PermissionDenied => LoaderError::Forbidden(e.to_string()),
            _ => LoaderError::Transport(e.to_string()),
        })?;

        Ok(Blob::sniffed(data, None))
    }
}

#[async_trait]
impl Storage for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn put(&self, key: &str, blob: &Blob) -> Result<(), StorageError> {
        let path = self.path_for(key).map_err(StorageError::Forbidden)?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a unique temp file, then atomically rename
        let temp_path = temp_path_for(&path);
        if let Err(e) = tokio::fs::write(&temp_path, blob.bytes()).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

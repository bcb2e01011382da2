//! S3 store
//!
//! Keys map to `base_dir/key` objects in one bucket. Works against AWS and
//! S3-compatible endpoints (MinIO, LocalStack) via `endpoint` and
//! `force_path_style`.

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use super::{join_key, sanitize, strip_prefix};
use crate::blob::Blob;
use crate::config::S3StoreConfig;
use crate::loader::{Loader, LoaderError};
use crate::storage::{Storage, StorageError};

/// Loader + storage backed by an S3 bucket
pub struct S3Store {
    client: S3Client,
    bucket: String,
    base_dir: String,
    path_prefix: String,
    max_allowed_size: u64,
}

impl S3Store {
    /// Build the client from configuration.
    ///
    /// Static credentials are used when configured, otherwise the default
    /// AWS provider chain (env, profile, instance metadata).
    pub async fn connect(config: &S3StoreConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if !config.access_key.is_empty() {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "kagami-config",
            ));
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Self::with_client(S3Client::from_conf(s3_config), config)
    }

    /// Wrap an existing client
    pub fn with_client(client: S3Client, config: &S3StoreConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            base_dir: config.base_dir.clone(),
            path_prefix: config.path_prefix.clone(),
            max_allowed_size: config.max_allowed_size,
        }
    }

    fn object_key(&self, key: &str) -> Result<String, String> {
        let relative = strip_prefix(key, &self.path_prefix).unwrap_or(key);
        let relative = sanitize(relative.trim_start_matches('/'))?;
        Ok(join_key(&self.base_dir, relative))
    }
}

#[async_trait]
impl Loader for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    fn can_handle(&self, key: &str) -> bool {
        strip_prefix(key, &self.path_prefix).is_some_and(|rest| !rest.is_empty())
    }

    async fn fetch(&self, key: &str) -> Result<Blob, LoaderError> {
        let object_key = self.object_key(key).map_err(LoaderError::Forbidden)?;

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.as_service_error();
                if service_error.is_some_and(|se| se.is_no_such_key()) {
                    return LoaderError::NotFound;
                }
                match service_error.and_then(|se| se.code()) {
                    Some("NoSuchKey") | Some("NotFound") => LoaderError::NotFound,
                    Some("AccessDenied") => LoaderError::Forbidden(format!(
                        "access denied to s3://{}/{}",
                        self.bucket, object_key
                    )),
                    _ => LoaderError::Transport(format!("S3 fetch failed: {e}")),
                }
            })?;

        if let Some(length) = response.content_length().filter(|l| *l >= 0) {
            let length = length as u64;
            if self.max_allowed_size > 0 && length > self.max_allowed_size {
                return Err(LoaderError::SizeExceeded {
                    size: length,
                    limit: self.max_allowed_size,
                });
            }
        }

        let content_type = response.content_type().map(str::to_string);
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| LoaderError::Transport(format!("failed to read S3 body: {e}")))?
            .into_bytes();

        if self.max_allowed_size > 0 && bytes.len() as u64 > self.max_allowed_size {
            return Err(LoaderError::SizeExceeded {
                size: bytes.len() as u64,
                limit: self.max_allowed_size,
            });
        }

        Ok(Blob::sniffed(bytes, content_type.as_deref()))
    }
}

#[async_trait]
impl Storage for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, key: &str, blob: &Blob) -> Result<(), StorageError> {
        let object_key = self.object_key(key).map_err(StorageError::Forbidden)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(blob.content_type())
            .body(ByteStream::from(blob.bytes().clone()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 put failed: {e}")))?;

        Ok(())
    }
}

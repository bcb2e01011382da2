//! Loader and storage backend configuration types.
//!
//! Every backend section is optional; an absent section means the backend is
//! not registered. Loaders are registered in a fixed order: file, s3, http.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HTTP_LOADER_TIMEOUT_MS, DEFAULT_S3_REGION};

fn default_s3_region() -> String {
    DEFAULT_S3_REGION.to_string()
}

fn default_http_timeout_ms() -> u64 {
    DEFAULT_HTTP_LOADER_TIMEOUT_MS
}

/// Filesystem store (loader and/or storage)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Root directory; keys resolve to `base_dir/key`
    pub base_dir: String,
    /// Only keys starting with this prefix are handled; it is stripped
    #[serde(default)]
    pub path_prefix: String,
    /// Maximum source size in bytes; 0 = unlimited
    #[serde(default)]
    pub max_allowed_size: u64,
}

/// S3 store (loader and/or storage)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StoreConfig {
    pub bucket: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Custom endpoint (MinIO, LocalStack)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Static credentials; the default provider chain is used when empty
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Object key prefix inside the bucket
    #[serde(default)]
    pub base_dir: String,
    /// Only keys starting with this prefix are handled; it is stripped
    #[serde(default)]
    pub path_prefix: String,
    /// Maximum source size in bytes; 0 = unlimited
    #[serde(default)]
    pub max_allowed_size: u64,
    /// Use path-style addressing (required by most S3 clones)
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_s3_region(),
            endpoint: None,
            access_key: String::new(),
            secret_key: String::new(),
            base_dir: String::new(),
            path_prefix: String::new(),
            max_allowed_size: 0,
            force_path_style: false,
        }
    }
}

/// HTTP source loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpLoaderConfig {
    /// Host glob patterns (`*.example.com`); empty = any host
    #[serde(default)]
    pub allowed_sources: Vec<String>,
    /// Maximum source size in bytes; 0 = unlimited
    #[serde(default)]
    pub max_allowed_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpLoaderConfig {
    fn default() -> Self {
        Self {
            allowed_sources: Vec::new(),
            max_allowed_size: 0,
            user_agent: None,
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileStoreConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StoreConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpLoaderConfig>,
}

impl LoadersConfig {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.s3.is_none() && self.http.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoragesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileStoreConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StoreConfig>,
}

// Configuration module
//
// YAML file with `${VAR}` environment substitution, validated before use.
// Command-line flags in `main` may override individual fields afterwards.

pub mod backends;
pub mod coalescing;
pub mod logging;
pub mod processor;
pub mod server;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backends::{
    FileStoreConfig, HttpLoaderConfig, LoadersConfig, S3StoreConfig, StoragesConfig,
};
pub use coalescing::CoalescingConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use processor::ProcessorConfig;
pub use server::{SecurityConfig, ServerConfig, TimeoutsConfig};

use crate::engine::{Engine, EngineBuilder};
use crate::loader::http::HttpLoader;
use crate::loader::Loader;
use crate::processor::image::{ImageOptions, ImageProcessor};
use crate::processor::Processor;
use crate::storage::Storage;
use crate::store::file::FileStore;
use crate::store::s3::S3Store;

/// Failure to load, validate or apply configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("environment variable '{0}' is referenced but not set")]
    MissingEnv(String),

    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to initialise {backend}: {message}")]
    Backend { backend: String, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub coalescing: CoalescingConfig,
    #[serde(default)]
    pub loaders: LoadersConfig,
    #[serde(default)]
    pub storages: StoragesConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn env_pattern() -> Result<Regex, ConfigError> {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| ConfigError::Invalid(e.to_string()))
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = env_pattern()?;

        // Every referenced variable must exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            if std::env::var(var_name).is_err() {
                return Err(ConfigError::MissingEnv(var_name.to_string()));
            }
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        Ok(serde_yaml::from_str(&substituted)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.secret.is_empty() && !self.security.unsafe_mode {
            return Err(ConfigError::Invalid(
                "security.secret is empty; set a secret or enable security.unsafe explicitly"
                    .to_string(),
            ));
        }

        if self.timeouts.request_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.request_ms must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.save_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.save_ms must be greater than 0".to_string(),
            ));
        }

        if self.coalescing.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid(
                "coalescing.max_in_flight must be greater than 0 when set".to_string(),
            ));
        }

        if !self.server.path_prefix.is_empty() && !self.server.path_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.path_prefix '{}' does not start with /",
                self.server.path_prefix
            )));
        }

        if self.loaders.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one loader must be configured".to_string(),
            ));
        }

        for (section, file) in [
            ("loaders.file", self.loaders.file.as_ref()),
            ("storages.file", self.storages.file.as_ref()),
        ] {
            if let Some(file) = file {
                if file.base_dir.is_empty() {
                    return Err(ConfigError::Invalid(format!("{section}.base_dir is empty")));
                }
            }
        }

        for (section, s3) in [
            ("loaders.s3", self.loaders.s3.as_ref()),
            ("storages.s3", self.storages.s3.as_ref()),
        ] {
            if let Some(s3) = s3 {
                if s3.bucket.is_empty() {
                    return Err(ConfigError::Invalid(format!("{section}.bucket is empty")));
                }
                if s3.access_key.is_empty() != s3.secret_key.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "{section}: access_key and secret_key must be set together"
                    )));
                }
            }
        }

        let quality = self.processor.default_quality;
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::Invalid(format!(
                "processor.default_quality {quality} is outside 1-100"
            )));
        }
        if self.processor.max_width == 0 || self.processor.max_height == 0 {
            return Err(ConfigError::Invalid(
                "processor.max_width and max_height must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the engine and its backends from this configuration
    pub async fn build_engine(&self) -> Result<Engine, ConfigError> {
        let mut loaders: Vec<Arc<dyn Loader>> = Vec::new();
        if let Some(file) = &self.loaders.file {
            loaders.push(Arc::new(FileStore::new(file)));
        }
        if let Some(s3) = &self.loaders.s3 {
            loaders.push(Arc::new(S3Store::connect(s3).await));
        }
        if let Some(http) = &self.loaders.http {
            let loader = HttpLoader::new(http).map_err(|e| ConfigError::Backend {
                backend: "http loader".to_string(),
                message: e.to_string(),
            })?;
            loaders.push(Arc::new(loader));
        }

        let mut storages: Vec<Arc<dyn Storage>> = Vec::new();
        if let Some(file) = &self.storages.file {
            storages.push(Arc::new(FileStore::new(file)));
        }
        if let Some(s3) = &self.storages.s3 {
            storages.push(Arc::new(S3Store::connect(s3).await));
        }

        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if self.processor.enabled {
            processors.push(Arc::new(ImageProcessor::new(ImageOptions::from(
                &self.processor,
            ))));
        }

        tracing::info!(
            loaders = loaders.len(),
            storages = storages.len(),
            processors = processors.len(),
            coalescing = self.coalescing.enabled,
            unsafe_mode = self.security.unsafe_mode,
            "Building engine"
        );

        let mut builder = EngineBuilder::new()
            .with_loaders(loaders)
            .with_storages(storages)
            .with_processors(processors)
            .with_secret(self.security.secret.as_bytes().to_vec())
            .with_request_timeout(Duration::from_millis(self.timeouts.request_ms))
            .with_save_timeout(Duration::from_millis(self.timeouts.save_ms))
            .with_strict_params(self.security.strict_params)
            .with_coalescing(self.coalescing.enabled)
            .with_coalescing_grace(Duration::from_millis(self.coalescing.grace_ms));
        if let Some(limit) = self.coalescing.max_in_flight {
            builder = builder.with_max_in_flight(limit);
        }

        Ok(builder.build())
    }
}

//! Server, security and timeout configuration types.
//!
//! Default values are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SAVE_TIMEOUT_MS,
};

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_save_timeout_ms() -> u64 {
    DEFAULT_SAVE_TIMEOUT_MS
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix stripped from request paths before processing (e.g. "/img")
    #[serde(default)]
    pub path_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            path_prefix: String::new(),
        }
    }
}

impl ServerConfig {
    /// `address:port` string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// URL signing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HMAC secret; may come from `${ENV}` substitution
    #[serde(default)]
    pub secret: String,
    /// Accept `unsafe/` paths and skip verification when no secret is set
    #[serde(default, rename = "unsafe")]
    pub unsafe_mode: bool,
    /// Reject unknown filter names at parse time
    #[serde(default)]
    pub strict_params: bool,
}

/// Deadlines for the two engine phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Fetch + transform deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_ms: u64,
    /// Write-back deadline
    #[serde(default = "default_save_timeout_ms")]
    pub save_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout_ms(),
            save_ms: default_save_timeout_ms(),
        }
    }
}

//! Coalescing configuration types.
//!
//! Default: enabled, with a short grace window and no in-flight limit.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_COALESCING_GRACE_MS;

/// Default enabled state
fn default_enabled() -> bool {
    true
}

fn default_grace_ms() -> u64 {
    DEFAULT_COALESCING_GRACE_MS
}

/// Request coalescing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescingConfig {
    /// Enable request coalescing (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How long a finished result keeps serving late arrivals
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Maximum number of distinct fingerprints being processed at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            grace_ms: default_grace_ms(),
            max_in_flight: None,
        }
    }
}

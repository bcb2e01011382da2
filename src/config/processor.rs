//! Image processor configuration types.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MAX_HEIGHT, DEFAULT_MAX_SOURCE_PIXELS, DEFAULT_MAX_WIDTH, DEFAULT_QUALITY,
};

fn default_max_width() -> u32 {
    DEFAULT_MAX_WIDTH
}

fn default_max_height() -> u32 {
    DEFAULT_MAX_HEIGHT
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_max_source_pixels() -> u64 {
    DEFAULT_MAX_SOURCE_PIXELS
}

/// Settings for the bundled image processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Register the bundled processor (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Reject requests using the `blur` filter
    #[serde(default)]
    pub disable_blur: bool,
    /// Further filter names to reject
    #[serde(default)]
    pub disabled_filters: Vec<String>,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// Quality used when the request carries no `quality()` filter
    #[serde(default = "default_quality")]
    pub default_quality: u8,
    /// Largest decoded source accepted, in pixels
    #[serde(default = "default_max_source_pixels")]
    pub max_source_pixels: u64,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            disable_blur: false,
            disabled_filters: Vec::new(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            default_quality: default_quality(),
            max_source_pixels: default_max_source_pixels(),
        }
    }
}

impl ProcessorConfig {
    /// All disabled filter names, including `blur` when `disable_blur` is set
    pub fn disabled(&self) -> Vec<String> {
        let mut names = self.disabled_filters.clone();
        if self.disable_blur && !names.iter().any(|n| n == "blur") {
            names.push("blur".to_string());
        }
        names
    }
}

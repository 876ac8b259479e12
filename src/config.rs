//! Monitor configuration
//!
//! A [`MonitorConfig`] is read from a JSON file. Every field has a default, so
//! an empty object is a valid configuration.

use crate::difficulty::DifficultyConfig;
use crate::engine::UatrConfig;
use crate::error::{ComputeError, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default source tag written into every packet
pub const DEFAULT_SOURCE: &str = "nuanic-ring";

/// Default frame queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Settings for one monitored subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub uatr: UatrConfig,
    #[serde(default)]
    pub difficulty: DifficultyConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            subject_id: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            uatr: UatrConfig::default(),
            difficulty: DifficultyConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: MonitorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ComputeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        self.uatr.validate()?;
        self.difficulty.validate()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

//! Tool configuration
//!
//! Loaded from an optional YAML file; every field has a default so an
//! empty file (or no file) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::connection::{DEFAULT_QUEUE_CAPACITY, RESPONSE_TIMEOUT};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolConfig {
    /// MIDI device name (case-insensitive substring of the port name)
    #[serde(default = "default_device")]
    pub device: String,
    /// How long to wait for a reply to a request
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Inbound frame queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_device() -> String {
    "LPD8".to_string()
}

fn default_response_timeout_ms() -> u64 {
    RESPONSE_TIMEOUT.as_millis() as u64
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            response_timeout_ms: default_response_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ToolConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as null rather than an empty map.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ToolConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.response_timeout_ms == 0 {
            anyhow::bail!("response_timeout_ms must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

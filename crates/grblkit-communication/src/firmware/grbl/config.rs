//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.

use crate::communication::DEFAULT_RX_BUFFER_CAPACITY;
use grblkit_core::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables of a [`ControllerEngine`](super::ControllerEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Device receive buffer size in bytes
    pub rx_buffer_capacity: usize,
    /// Period of the worker poll loop
    pub poll_interval_ms: u64,
    /// Period of automatic `?` status queries; 0 disables them
    pub status_query_interval_ms: u64,
    /// Quiet time after which a streaming session counts as finished
    pub gcode_idle_timeout_ms: u64,
    /// Streamed once the connection is established
    pub startup_commands: Vec<String>,
    /// Capacity of the event broadcast channel
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rx_buffer_capacity: DEFAULT_RX_BUFFER_CAPACITY,
            poll_interval_ms: 10,
            status_query_interval_ms: 200,
            gcode_idle_timeout_ms: 2000,
            startup_commands: vec!["$I".to_string(), "$G".to_string()],
            event_buffer_size: 100,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Parse {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rx_buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "rx_buffer_capacity must be greater than 0".to_string(),
            }
            .into());
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "poll_interval_ms must be greater than 0".to_string(),
            }
            .into());
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "event_buffer_size must be greater than 0".to_string(),
            }
            .into());
        }
        if let Some(cmd) = self
            .startup_commands
            .iter()
            .find(|c| c.len() + 1 > self.rx_buffer_capacity)
        {
            return Err(ConfigError::Invalid {
                reason: format!("startup command '{}' exceeds the receive buffer", cmd),
            }
            .into());
        }
        Ok(())
    }

    /// Poll loop period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Status query period, `None` when disabled
    pub fn status_query_interval(&self) -> Option<Duration> {
        (self.status_query_interval_ms > 0)
            .then(|| Duration::from_millis(self.status_query_interval_ms))
    }

    /// Streaming idle timeout
    pub fn gcode_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.gcode_idle_timeout_ms)
    }
}

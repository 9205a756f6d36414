//! Event bus configuration

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for an [`EventBus`](crate::EventBus)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Bus name, attached to every log record
    pub name: String,

    /// Capacity of the default in-memory failure log (0 = unbounded)
    pub failure_capacity: usize,

    /// Queue size for subscribers created by `EventBus::subscribe_channel`
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_capacity: 1_000,
            channel_capacity: 256,
        }
    }
}

impl BusConfig {
    /// Create a default config with the given bus name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config for values the bus cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EventError::Config("Bus name cannot be empty".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(EventError::Config(
                "Channel capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

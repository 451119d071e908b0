//! Context Settings
//!
//! Runtime knobs for a context, loaded from an optional TOML file with
//! environment overrides. Every field has a default, so an empty or missing
//! file yields a usable configuration.
//!
//! ```toml
//! [context]
//! max_components = 4096
//!
//! [packet]
//! payload_max = 1504
//! head_size = 4
//! tail_size = 0
//! pool_capacity = 64
//!
//! [log]
//! level = "info"
//! ```
//!
//! Environment variables use the `VSWITCH_` prefix and `__` between nested
//! keys, e.g. `VSWITCH_PACKET__HEAD_SIZE=8`.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use vswitch_packet::{MAX_ETH_FRAME_SIZE, MAX_PAYLOAD_SIZE};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "VSWITCH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub context: RegistrySettings,
    pub packet: PacketSettings,
    pub log: LogSettings,
}

/// Component registry limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Components a context accepts before reporting resource exhaustion
    pub max_components: usize,
}

/// Packet layout used by builtin connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketSettings {
    pub payload_max: usize,
    pub head_size: usize,
    pub tail_size: usize,
    /// Released packets cached per connection
    pub pool_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `vswitch_core=debug`
    pub level: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_components: 4096,
        }
    }
}

impl Default for PacketSettings {
    fn default() -> Self {
        Self {
            payload_max: MAX_ETH_FRAME_SIZE,
            head_size: 0,
            tail_size: 0,
            pool_capacity: 64,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ContextSettings {
    /// Load settings from `path` (if given) with `VSWITCH_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, ENV_PREFIX)
    }

    /// Load settings using a custom environment prefix
    pub fn load_with_env(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading context settings: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .context("Failed to build context settings")?;

        let settings: ContextSettings = config
            .try_deserialize()
            .context("Failed to deserialize context settings")?;

        settings.validate()?;
        debug!(?settings, "context settings loaded");
        Ok(settings)
    }

    /// Reject values no context can honor
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.context.max_components == 0 {
            return Err(ConfigError::invalid(
                "a context must accept at least one component",
                Some("context.max_components"),
            ));
        }
        if self.packet.payload_max > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::invalid(
                format!(
                    "payload_max {} exceeds the 16-bit length field",
                    self.packet.payload_max
                ),
                Some("packet.payload_max"),
            ));
        }
        Ok(())
    }
}

// src/config.rs

//! Manages client configuration: loading from TOML, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Settings for the inbound discovery feed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Capacity of the queue created by `discovery_channel`. Publishers wait when it is full.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
        }
    }
}

/// Settings for pipelined connections.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum number of outstanding exchanges per connection.
    #[serde(default = "default_max_pipelined_requests")]
    pub max_pipelined_requests: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pipelined_requests: default_max_pipelined_requests(),
        }
    }
}

/// Settings for the partitioned client group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// Upper bound on how long an aggregate close waits for partitions to shut down.
    #[serde(default = "default_close_timeout", with = "humantime_serde")]
    pub close_timeout: Duration,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            close_timeout: default_close_timeout(),
        }
    }
}

/// The complete configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `tracing` filter directive used when `RUST_LOG` is unset, e.g. `"info"`
    /// or `"shardline=debug,warn"`. The library never installs a subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub group: GroupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            discovery: DiscoveryConfig::default(),
            pipeline: PipelineConfig::default(),
            group: GroupConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_queue_size() -> usize {
    32
}
fn default_max_pipelined_requests() -> usize {
    16
}
fn default_close_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates the configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        if self.discovery.max_queue_size == 0 {
            return Err(anyhow!("discovery.max_queue_size cannot be 0"));
        }
        if self.pipeline.max_pipelined_requests == 0 {
            return Err(anyhow!("pipeline.max_pipelined_requests cannot be 0"));
        }
        if self.pipeline.max_pipelined_requests == 1 {
            warn!(
                "pipeline.max_pipelined_requests is 1; requests on a connection will not overlap."
            );
        }
        if self.group.close_timeout.is_zero() {
            return Err(anyhow!("group.close_timeout cannot be 0"));
        }
        Ok(())
    }
}

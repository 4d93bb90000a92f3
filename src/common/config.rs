//! Configuration for shardroute components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix, e.g. `SHARDROUTE__ALLOCATION__NODE_CONCURRENT_RECOVERIES=4`
pub const ENV_PREFIX: &str = "SHARDROUTE";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Placement settings handed to the allocation engine
    #[serde(default)]
    pub allocation: AllocationSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            allocation: AllocationSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and
    /// `SHARDROUTE__*` environment variables, in that order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.allocation.validate()?;
        Ok(config)
    }
}

/// Which shard copies the engine is allowed to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableAllocation {
    /// Primaries and replicas
    #[default]
    All,
    /// Primaries only
    Primaries,
    /// Only primaries of freshly created indices
    NewPrimaries,
    /// Nothing is placed
    None,
}

/// Cluster-wide placement settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Maximum INITIALIZING copies (including incoming relocations) per node
    #[serde(default = "default_node_concurrent_recoveries")]
    pub node_concurrent_recoveries: usize,

    /// Allocation filter
    #[serde(default)]
    pub enable: EnableAllocation,
}

fn default_node_concurrent_recoveries() -> usize {
    2
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            node_concurrent_recoveries: default_node_concurrent_recoveries(),
            enable: EnableAllocation::default(),
        }
    }
}

impl AllocationSettings {
    pub fn with_concurrent_recoveries(mut self, limit: usize) -> Self {
        self.node_concurrent_recoveries = limit;
        self
    }

    pub fn with_enable(mut self, enable: EnableAllocation) -> Self {
        self.enable = enable;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_concurrent_recoveries == 0 {
            return Err(Error::InvalidConfig(
                "node_concurrent_recoveries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

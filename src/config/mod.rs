//! Configuration for the per-follower replication agents.
//!
//! Loaded from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML file
//! 3. Environment variables prefixed with `REPLICATOR__` (highest priority)

mod heartbeat;
mod network;
pub use heartbeat::*;
pub use network::*;


//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "REPLICATOR";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ReplicatorConfig {
    /// Heartbeat scheduling and request sizing
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Transport timeouts
    #[serde(default)]
    pub network: NetworkConfig,
}

impl ReplicatorConfig {
    /// Load and validate configuration.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a TOML file overriding the defaults
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.heartbeat.validate()?;
        self.network.validate()?;
        Ok(())
    }
}

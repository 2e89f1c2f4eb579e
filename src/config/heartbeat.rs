use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Heartbeat scheduling parameters shared by every follower agent
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeartbeatConfig {
    /// Idle period after which an empty append request is sent to a follower.
    /// Any dispatch to the follower restarts this countdown.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_in_ms: u64,

    /// Upper bound on entries carried by a single append request
    #[serde(default = "default_max_entries_per_request")]
    pub max_entries_per_request: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_in_ms: default_heartbeat_interval(),
            max_entries_per_request: default_max_entries_per_request(),
        }
    }
}

impl HeartbeatConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_in_ms)
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "heartbeat_interval_in_ms cannot be 0".into(),
            )));
        }

        if self.max_entries_per_request == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_entries_per_request must be > 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_heartbeat_interval() -> u64 {
    50
}
fn default_max_entries_per_request() -> u64 {
    100
}

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Timeouts applied by the gRPC transport.
///
/// The transport timeout is the only cancellation applied to an in-flight
/// replication RPC.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Append entries request completion timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Snapshot transfer completion timeout in milliseconds
    #[serde(default = "default_snapshot_request_timeout")]
    pub snapshot_request_timeout_in_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            snapshot_request_timeout_in_ms: default_snapshot_request_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    pub fn snapshot_request_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_request_timeout_in_ms)
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 || self.request_timeout_in_ms == 0 || self.snapshot_request_timeout_in_ms == 0
        {
            return Err(Error::Config(ConfigError::Message(
                "network timeouts must be greater than 0".into(),
            )));
        }

        if self.request_timeout_in_ms < self.connect_timeout_in_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "request_timeout_in_ms {} should not be less than connect_timeout_in_ms {}",
                self.request_timeout_in_ms, self.connect_timeout_in_ms
            ))));
        }

        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    100
}
fn default_request_timeout() -> u64 {
    200
}
// 1 hour - sufficient for large snapshots
fn default_snapshot_request_timeout() -> u64 {
    3_600_000
}

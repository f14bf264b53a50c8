//! Node polling and actuation configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Settings shared by every node task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Time between temperature samples in milliseconds
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on one valve actuation in milliseconds
    #[serde(rename = "actuation-timeout-ms", default = "default_actuation_timeout_ms")]
    pub actuation_timeout_ms: u64,

    /// Channel buffer size for commands addressed to a node
    #[serde(rename = "command-buffer", default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_poll_interval_ms() -> u64 {
    debug!("default_poll_interval_ms: called");
    10_000
}

fn default_actuation_timeout_ms() -> u64 {
    debug!("default_actuation_timeout_ms: called");
    30_000
}

fn default_command_buffer() -> usize {
    debug!("default_command_buffer: called");
    16
}

impl Default for NodeConfig {
    fn default() -> Self {
        debug!("NodeConfig::default: called");
        Self {
            poll_interval_ms: 10_000,
            actuation_timeout_ms: 30_000,
            command_buffer: 16,
        }
    }
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        debug!(poll_interval_ms = %self.poll_interval_ms, "NodeConfig::poll_interval: called");
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn actuation_timeout(&self) -> Duration {
        debug!(actuation_timeout_ms = %self.actuation_timeout_ms, "NodeConfig::actuation_timeout: called");
        Duration::from_millis(self.actuation_timeout_ms)
    }
}

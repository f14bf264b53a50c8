//! Coordinator configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Channel buffer size for control requests (snapshot, metrics, shutdown)
    #[serde(rename = "request-buffer", default = "default_request_buffer")]
    pub request_buffer: usize,

    /// Rewrite the ledger journal to its live entries on startup and shutdown
    #[serde(rename = "compact-journal", default = "default_compact_journal")]
    pub compact_journal: bool,
}

fn default_request_buffer() -> usize {
    debug!("default_request_buffer: called");
    64
}

fn default_compact_journal() -> bool {
    debug!("default_compact_journal: called");
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            request_buffer: 64,
            compact_journal: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.request_buffer, 64);
        assert!(config.compact_journal);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("request-buffer: 8\n").unwrap();
        assert_eq!(config.request_buffer, 8);
        assert!(config.compact_journal);
    }
}

//! Heat exchange configuration types and loading

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;
use crate::domain::{NodeSpec, Thresholds};
use crate::error::ConfigError;
use crate::node::NodeConfig;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level: TRACE, DEBUG, INFO, WARN or ERROR
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Nominal temperature band shared by every node
    pub thresholds: Thresholds,

    /// Node polling and actuation settings
    pub node: NodeConfig,

    /// Coordinator settings
    pub coordinator: CoordinatorConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Static node inventory, loaded once
    pub nodes: Vec<NodeSpec>,
}

impl Default for Config {
    fn default() -> Self {
        debug!("Config::default: called");
        Self {
            log_level: None,
            thresholds: Thresholds::default(),
            node: NodeConfig::default(),
            coordinator: CoordinatorConfig::default(),
            storage: StorageConfig::default(),
            nodes: default_inventory(),
        }
    }
}

/// Two rooms: one full unit and one bare sensor
fn default_inventory() -> Vec<NodeSpec> {
    vec![
        NodeSpec::new(0, "Room_A", "Sensor_1", 0),
        NodeSpec::new(1, "Room_B", "Sensor_1", 3).sensor_only(),
    ]
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with a clear message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!(nodes = self.nodes.len(), "Config::validate: called");
        let Thresholds { lower_c, upper_c } = self.thresholds;
        if lower_c >= upper_c || lower_c.is_nan() || upper_c.is_nan() {
            return Err(ConfigError::InvertedThresholds {
                lower: lower_c,
                upper: upper_c,
            });
        }
        if self.node.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("node.poll-interval-ms"));
        }
        if self.node.actuation_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("node.actuation-timeout-ms"));
        }

        let mut seen = HashSet::new();
        for spec in &self.nodes {
            if !seen.insert(spec.id) {
                return Err(ConfigError::DuplicateNode(spec.id));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .heatexchange.yml
        let local_config = PathBuf::from(".heatexchange.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/heatexchange/heatexchange.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("heatexchange").join("heatexchange.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Only the log level, so logging can start before the full load
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the favor ledger journal; no journal when unset
    #[serde(rename = "ledger-dir")]
    pub ledger_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.thresholds.upper_c, 24.0);
        assert_eq!(config.thresholds.lower_c, 20.0);
        assert_eq!(config.node.poll_interval_ms, 10_000);
        assert!(config.storage.ledger_dir.is_none());
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].room, "Room_A");
        assert!(!config.nodes[0].sensor_only);
        assert_eq!(config.nodes[1].sensor_pin, 3);
        assert!(config.nodes[1].sensor_only);
        // Both deployed units report under the same sensor name
        assert_eq!(config.nodes[0].name, "Sensor_1");
        assert_eq!(config.nodes[1].name, "Sensor_1");
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

thresholds:
  upper-c: 26.5
  lower-c: 19

node:
  poll-interval-ms: 2000

coordinator:
  request-buffer: 16

storage:
  ledger-dir: /var/lib/heatexchange

nodes:
  - id: 4
    room: Kitchen
    name: Sensor_4
    sensor-pin: 2
  - id: 5
    room: Hall
    name: Sensor_5
    sensor-only: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.thresholds, Thresholds::new(19.0, 26.5));
        assert_eq!(config.node.poll_interval_ms, 2000);
        assert_eq!(config.node.actuation_timeout_ms, 30_000);
        assert_eq!(config.coordinator.request_buffer, 16);
        assert_eq!(config.storage.ledger_dir, Some(PathBuf::from("/var/lib/heatexchange")));
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].id, NodeId(4));
        assert_eq!(config.nodes[0].sensor_pin, 2);
        assert!(config.nodes[1].sensor_only);
        assert_eq!(config.nodes[1].sensor_pin, 0);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = serde_yaml::from_str("thresholds:\n  upper-c: 25\n").unwrap();
        assert_eq!(config.thresholds.upper_c, 25.0);
        assert_eq!(config.thresholds.lower_c, 20.0);
        assert_eq!(config.nodes.len(), 2);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let config = Config {
            thresholds: Thresholds::new(24.0, 24.0),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedThresholds {
                lower: 24.0,
                upper: 24.0
            })
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let config = Config {
            nodes: vec![NodeSpec::new(1, "A", "a", 0), NodeSpec::new(1, "B", "b", 1)],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DuplicateNode(NodeId(1))));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = Config::default();
        config.node.poll_interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("node.poll-interval-ms")));

        let mut config = Config::default();
        config.node.actuation_timeout_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("node.actuation-timeout-ms")));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("hx.yml");
        fs::write(&path, "log-level: warn\nnodes: []\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.nodes.is_empty());
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}

//! Alerts raised by nodes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::NodeId;

/// What the node is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// Crossed the upper threshold
    Hot,
    /// Crossed the lower threshold
    Cold,
    /// Returned to the nominal band after being out of it
    Stabilized,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hot => write!(f, "hot"),
            Self::Cold => write!(f, "cold"),
            Self::Stabilized => write!(f, "stabilized"),
        }
    }
}

/// Immutable threshold-crossing report, consumed exactly once by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "source-node-id")]
    pub source: NodeId,
    pub kind: AlertKind,
    #[serde(rename = "observed-temp-c")]
    pub observed_temp_c: f64,
}

impl Alert {
    pub fn new(source: NodeId, kind: AlertKind, observed_temp_c: f64) -> Self {
        Self {
            source,
            kind,
            observed_temp_c,
        }
    }

    pub fn hot(source: NodeId, observed_temp_c: f64) -> Self {
        Self::new(source, AlertKind::Hot, observed_temp_c)
    }

    pub fn cold(source: NodeId, observed_temp_c: f64) -> Self {
        Self::new(source, AlertKind::Cold, observed_temp_c)
    }

    pub fn stabilized(source: NodeId, observed_temp_c: f64) -> Self {
        Self::new(source, AlertKind::Stabilized, observed_temp_c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_serialization_uses_kebab_keys() {
        let alert = Alert::hot(NodeId(3), 26.5);
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("source-node-id"));
        assert!(json.contains("\"hot\""));

        let back: Alert = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alert);
    }
}

//! Node identity and threshold classification

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Stable integer identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Raw integer value
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Static inventory entry for one sensor unit
///
/// Immutable after registration. A sensor-only unit has no valve actuator
/// and no display attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub room: String,
    pub name: String,

    /// Analog input pin of the temperature sensor
    #[serde(rename = "sensor-pin", default)]
    pub sensor_pin: u8,

    #[serde(rename = "sensor-only", default)]
    pub sensor_only: bool,
}

impl NodeSpec {
    /// Create a full sensor unit (sensor, valve and display)
    pub fn new(id: impl Into<NodeId>, room: impl Into<String>, name: impl Into<String>, sensor_pin: u8) -> Self {
        Self {
            id: id.into(),
            room: room.into(),
            name: name.into(),
            sensor_pin,
            sensor_only: false,
        }
    }

    /// Mark this unit as sensor-only
    pub fn sensor_only(mut self) -> Self {
        self.sensor_only = true;
        self
    }
}

/// Where a node's latest temperature sits relative to the nominal band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdState {
    #[default]
    Nominal,
    TooHot,
    TooCold,
}

impl ThresholdState {
    pub fn is_nominal(self) -> bool {
        self == Self::Nominal
    }
}

impl fmt::Display for ThresholdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nominal => write!(f, "nominal"),
            Self::TooHot => write!(f, "too-hot"),
            Self::TooCold => write!(f, "too-cold"),
        }
    }
}

/// Nominal temperature band `[lower, upper)` in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    #[serde(rename = "upper-c")]
    pub upper_c: f64,

    #[serde(rename = "lower-c")]
    pub lower_c: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            upper_c: 24.0,
            lower_c: 20.0,
        }
    }
}

impl Thresholds {
    pub fn new(lower_c: f64, upper_c: f64) -> Self {
        Self { upper_c, lower_c }
    }

    /// Classify a reading: `>= upper` is hot, `< lower` is cold
    pub fn classify(&self, temp_c: f64) -> ThresholdState {
        debug!(temp_c, upper_c = self.upper_c, lower_c = self.lower_c, "Thresholds::classify: called");
        if temp_c >= self.upper_c {
            ThresholdState::TooHot
        } else if temp_c < self.lower_c {
            ThresholdState::TooCold
        } else {
            ThresholdState::Nominal
        }
    }
}

pub fn celsius_to_fahrenheit(temp_c: f64) -> f64 {
    temp_c * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let t = Thresholds::new(20.0, 24.0);
        assert_eq!(t.classify(20.0), ThresholdState::Nominal);
        assert_eq!(t.classify(19.99), ThresholdState::TooCold);
        assert_eq!(t.classify(23.99), ThresholdState::Nominal);
        assert_eq!(t.classify(24.0), ThresholdState::TooHot);
    }

    #[test]
    fn test_default_band() {
        let t = Thresholds::default();
        assert_eq!(t.upper_c, 24.0);
        assert_eq!(t.lower_c, 20.0);
    }

    #[test]
    fn test_fahrenheit() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
    }

    #[test]
    fn test_node_spec_yaml() {
        let yaml = "id: 1\nroom: Room_B\nname: Sensor_1\nsensor-pin: 3\nsensor-only: true\n";
        let spec: NodeSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec, NodeSpec::new(1, "Room_B", "Sensor_1", 3).sensor_only());
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(7).to_string(), "node-7");
    }
}

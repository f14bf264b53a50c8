//! Hardware ports
//!
//! The core never talks to a sensor, motor or LCD directly. Each node is
//! given one implementation of each trait below; the daemon wires real
//! drivers, tests wire the simulated ones from [`sim`].

mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ActuatorError, DisplayError, SensorError};

pub use sim::{RecordingDisplay, SimulatedSensor, SimulatedValve, ValveCall};

/// Read side: the node polls this once per cycle
#[async_trait]
pub trait TemperatureSource: Send {
    /// Current temperature in degrees Celsius; failures are transient
    async fn read_celsius(&mut self) -> Result<f64, SensorError>;
}

/// Valve stepper motor
///
/// Both calls must be safe when the valve is already in the target state.
/// Nodes still track the logical state themselves and never query the motor.
#[async_trait]
pub trait ValveActuator: Send {
    async fn open(&mut self) -> Result<(), ActuatorError>;

    async fn close(&mut self) -> Result<(), ActuatorError>;
}

/// Status display; fire-and-forget
pub trait DisplaySink: Send {
    fn show_status(&mut self, text: &str, color: ColorHint) -> Result<(), DisplayError>;
}

/// Backlight colour requested from the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorHint {
    Red,
    Blue,
    Green,
    White,
    Off,
}

/// The hardware attached to one node
///
/// Sensor-only nodes carry neither a valve nor a display.
pub struct NodeHardware {
    pub sensor: Box<dyn TemperatureSource>,
    pub valve: Option<Box<dyn ValveActuator>>,
    pub display: Option<Box<dyn DisplaySink>>,
}

impl NodeHardware {
    /// A full unit: sensor, valve and display
    pub fn full(
        sensor: impl TemperatureSource + 'static,
        valve: impl ValveActuator + 'static,
        display: impl DisplaySink + 'static,
    ) -> Self {
        Self {
            sensor: Box::new(sensor),
            valve: Some(Box::new(valve)),
            display: Some(Box::new(display)),
        }
    }

    /// A bare temperature sensor
    pub fn sensor_only(sensor: impl TemperatureSource + 'static) -> Self {
        Self {
            sensor: Box::new(sensor),
            valve: None,
            display: None,
        }
    }
}

impl std::fmt::Debug for NodeHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHardware")
            .field("valve", &self.valve.is_some())
            .field("display", &self.display.is_some())
            .finish()
    }
}

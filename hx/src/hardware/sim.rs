//! In-memory hardware for tests and bench demos
//!
//! Every simulated device is a cheap clone around shared state, so a test
//! keeps one clone to steer readings or inject faults while the node owns
//! the other.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ColorHint, DisplaySink, TemperatureSource, ValveActuator};
use crate::error::{ActuatorError, DisplayError, SensorError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct SensorState {
    temp_c: f64,
    failures_pending: usize,
    reads: u64,
}

/// Temperature source whose reading is set by the test
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SensorState>>,
}

impl SimulatedSensor {
    pub fn new(temp_c: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SensorState {
                temp_c,
                failures_pending: 0,
                reads: 0,
            })),
        }
    }

    pub fn set(&self, temp_c: f64) {
        debug!(temp_c, "SimulatedSensor::set: called");
        lock(&self.state).temp_c = temp_c;
    }

    pub fn get(&self) -> f64 {
        lock(&self.state).temp_c
    }

    /// Make the next `count` reads fail
    pub fn fail_next_reads(&self, count: usize) {
        lock(&self.state).failures_pending = count;
    }

    /// Number of read attempts so far, failed ones included
    pub fn reads(&self) -> u64 {
        lock(&self.state).reads
    }
}

#[async_trait]
impl TemperatureSource for SimulatedSensor {
    async fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let mut state = lock(&self.state);
        state.reads += 1;
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(SensorError::ReadFailed("simulated read fault".to_string()));
        }
        Ok(state.temp_c)
    }
}

/// One call made against a simulated valve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveCall {
    Open,
    Close,
}

#[derive(Debug, Default)]
struct ValveState {
    open: bool,
    calls: Vec<ValveCall>,
    open_faults: usize,
    close_faults: usize,
    delay: Option<Duration>,
}

/// Valve motor that records every call and can be told to fault
#[derive(Debug, Clone, Default)]
pub struct SimulatedValve {
    state: Arc<Mutex<ValveState>>,
}

impl SimulatedValve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical position as the motor last left it
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn calls(&self) -> Vec<ValveCall> {
        lock(&self.state).calls.clone()
    }

    /// Make the next `count` open calls fail
    pub fn fail_next_opens(&self, count: usize) {
        lock(&self.state).open_faults = count;
    }

    /// Make the next `count` close calls fail
    pub fn fail_next_closes(&self, count: usize) {
        lock(&self.state).close_faults = count;
    }

    /// Slow every actuation down by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        lock(&self.state).delay = delay;
    }

    async fn actuate(&self, call: ValveCall) -> Result<(), ActuatorError> {
        let delay = lock(&self.state).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        state.calls.push(call);
        let faults = match call {
            ValveCall::Open => &mut state.open_faults,
            ValveCall::Close => &mut state.close_faults,
        };
        if *faults > 0 {
            *faults -= 1;
            return Err(ActuatorError::MotorFault(format!("simulated {:?} fault", call)));
        }
        state.open = call == ValveCall::Open;
        Ok(())
    }
}

#[async_trait]
impl ValveActuator for SimulatedValve {
    async fn open(&mut self) -> Result<(), ActuatorError> {
        self.actuate(ValveCall::Open).await
    }

    async fn close(&mut self) -> Result<(), ActuatorError> {
        self.actuate(ValveCall::Close).await
    }
}

#[derive(Debug, Default)]
struct DisplayState {
    lines: Vec<(String, ColorHint)>,
    failing: bool,
}

/// Display that keeps everything written to it
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    state: Arc<Mutex<DisplayState>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(String, ColorHint)> {
        lock(&self.state).lines.clone()
    }

    pub fn last(&self) -> Option<(String, ColorHint)> {
        lock(&self.state).lines.last().cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }
}

impl DisplaySink for RecordingDisplay {
    fn show_status(&mut self, text: &str, color: ColorHint) -> Result<(), DisplayError> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(DisplayError("simulated display fault".to_string()));
        }
        state.lines.push((text.to_string(), color));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sensor_fault_injection() {
        let mut sensor = SimulatedSensor::new(21.0);
        sensor.fail_next_reads(1);

        assert!(sensor.read_celsius().await.is_err());
        assert_eq!(sensor.read_celsius().await.unwrap(), 21.0);
        assert_eq!(sensor.reads(), 2);
    }

    #[tokio::test]
    async fn test_valve_records_calls_and_faults() {
        let mut valve = SimulatedValve::new();
        let shared = valve.clone();

        valve.fail_next_opens(1);
        assert!(valve.open().await.is_err());
        assert!(!shared.is_open());

        valve.open().await.unwrap();
        assert!(shared.is_open());

        valve.close().await.unwrap();
        assert!(!shared.is_open());
        assert_eq!(shared.calls(), vec![ValveCall::Open, ValveCall::Open, ValveCall::Close]);
    }

    #[test]
    fn test_display_failure_not_recorded() {
        let mut display = RecordingDisplay::new();
        display.show_status("21.0 C", ColorHint::Green).unwrap();
        display.set_failing(true);
        assert!(display.show_status("22.0 C", ColorHint::Green).is_err());
        assert_eq!(display.lines().len(), 1);
    }
}

//! HeatExchange - room-to-room heat balancing between thermal sensor nodes
//!
//! A small set of autonomous nodes each watch one room's temperature. When a
//! node leaves the nominal band it raises an alert; the coordinator matches it
//! with a helper node whose temperature can relieve it, opens both valves and
//! records the favor. When the distressed node stabilizes, the coordinator
//! closes every helper it recorded.
//!
//! # Core Concepts
//!
//! - **Edge-triggered alerts**: a node alerts on entering Hot or Cold, not on every poll
//! - **Process to completion**: one alert's commands and ledger update finish before the next
//! - **Single ledger writer**: only the coordinator mutates the favor ledger
//! - **No valve left open**: shutdown releases every helper, then every node closes its own valve
//!
//! # Modules
//!
//! - [`domain`] - Node identity, thresholds, alerts and valve commands
//! - [`hardware`] - Sensor, valve and display ports with simulated implementations
//! - [`node`] - Per-node state machine and polling task
//! - [`coordinator`] - Alert queue, matching, favor ledger and its journal
//! - [`system`] - Starting and stopping the whole system
//! - [`config`] - Configuration types and loading
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod node;
pub mod system;

// Re-export commonly used types
pub use config::{Config, StorageConfig};
pub use coordinator::{
    AlertOutcome, AlertQueue, AlertSender, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics,
    CoordinatorSnapshot, Dispatcher, FavorLedger, LedgerJournal, SettlementReport,
};
pub use domain::{Alert, AlertKind, CommandOutcome, NodeId, NodeSpec, ThresholdState, Thresholds, ValveCommand};
pub use error::{ActuatorError, CommandError, ConfigError, DisplayError, LedgerError, QueueClosed, SensorError};
pub use hardware::{ColorHint, DisplaySink, NodeHardware, TemperatureSource, ValveActuator};
pub use node::{Node, NodeConfig, NodeHandle, NodeSnapshot};
pub use system::{HeatExchanger, TeardownReport};

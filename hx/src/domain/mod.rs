//! Domain types shared by nodes and the coordinator
//!
//! Everything here is plain data: identities, threshold bands, alerts and
//! valve commands. Behavior lives in [`crate::node`] and [`crate::coordinator`].

mod alert;
mod command;
mod node;

pub use alert::{Alert, AlertKind};
pub use command::{CommandOutcome, ValveCommand};
pub use node::{NodeId, NodeSpec, ThresholdState, Thresholds, celsius_to_fahrenheit};

//! Sensor nodes
//!
//! Each node runs as its own tokio task: it samples its temperature source
//! on a fixed interval, raises alerts into the coordinator's queue, and
//! executes valve commands sent by the coordinator. Everything else reads
//! the node through [`NodeHandle`].

mod config;
mod handle;
mod state;
mod unit;

pub use config::NodeConfig;
pub use handle::{NodeHandle, NodeRequest};
pub use state::{Actuation, NodeSnapshot, NodeState, Observation};
pub use unit::{Node, NodeTeardown};

//! Error types for hardware, commands and the favor ledger

use std::time::Duration;
use thiserror::Error;

use crate::domain::{Alert, NodeId};

/// Temperature read failure; the poll cycle is skipped
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    #[error("Sensor read failed: {0}")]
    ReadFailed(String),

    #[error("Sensor returned a non-finite value: {0}")]
    NotFinite(f64),
}

/// Valve motor failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("Motor fault: {0}")]
    MotorFault(String),

    #[error("Actuation did not finish within {0:?}")]
    Timeout(Duration),
}

/// Display failure; logged by the node, never propagated
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Display write failed: {0}")]
pub struct DisplayError(pub String);

/// Failure of a command issued to a node
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0} actuator failed: {1}")]
    Actuator(NodeId, #[source] ActuatorError),

    #[error("{0} is sensor-only and has no valve")]
    SensorOnly(NodeId),

    #[error("{0} is not reachable")]
    NodeUnavailable(NodeId),
}

impl CommandError {
    /// Node the failed command was addressed to
    pub fn node(&self) -> NodeId {
        match self {
            Self::Actuator(id, _) | Self::SensorOnly(id) | Self::NodeUnavailable(id) => *id,
        }
    }
}

/// The coordinator is gone and the alert was not queued
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Alert queue closed, dropped {} alert from {}", .0.kind, .0.source)]
pub struct QueueClosed(pub Alert);

/// Favor ledger invariant violation; these are programmer errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{helper} already helps {existing}, cannot also help {requested}")]
    HelperCommitted {
        helper: NodeId,
        existing: NodeId,
        requested: NodeId,
    },

    #[error("{0} cannot help itself")]
    SelfAssist(NodeId),

    #[error("{0} is listed as a helper while its valve is closed")]
    ClosedHelper(NodeId),

    #[error("{0} is both helped and helping")]
    ChainedAssist(NodeId),
}

/// Configuration validation failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Lower threshold {lower} must be below upper threshold {upper}")]
    InvertedThresholds { lower: f64, upper: f64 },

    #[error("Duplicate node id {0} in inventory")]
    DuplicateNode(NodeId),

    #[error("Invalid value for {0}: must be greater than zero")]
    ZeroDuration(&'static str),
}

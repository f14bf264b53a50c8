//! Node state machine
//!
//! Pure bookkeeping for one sensor unit: threshold transitions, valve state
//! and the helper commitment. No I/O happens here; the [`Node`](super::Node)
//! task drives the hardware and applies the results.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AlertKind, NodeId, NodeSpec, ThresholdState, Thresholds, ValveCommand};

/// Read-only view of a node, published after every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub sensor_only: bool,
    pub latest_temp_c: Option<f64>,
    pub threshold_state: ThresholdState,
    pub valve_open: bool,
    pub assisting_for: Option<NodeId>,
}

/// What a single reading changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observation {
    pub previous: ThresholdState,
    pub current: ThresholdState,

    /// The node left an out-of-band state; report once the own valve is handled
    pub stabilized: bool,

    /// Newly entered Hot or Cold
    pub raised: Option<AlertKind>,

    /// Own valve should be closed locally before reporting
    pub close_own_valve: bool,
}

impl Observation {
    /// Alerts to emit, in order
    pub fn alerts(&self) -> impl Iterator<Item = AlertKind> + '_ {
        self.stabilized
            .then_some(AlertKind::Stabilized)
            .into_iter()
            .chain(self.raised)
    }
}

/// Whether a command needs the actuator at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    Open,
    Close,
    /// Valve already in the target state
    Skip,
}

/// Mutable state of one node; the node task is its only writer
#[derive(Debug, Clone)]
pub struct NodeState {
    spec: NodeSpec,
    latest_temp_c: Option<f64>,
    threshold_state: ThresholdState,
    valve_open: bool,
    assisting_for: Option<NodeId>,
}

impl NodeState {
    pub fn new(spec: NodeSpec) -> Self {
        debug!(node_id = %spec.id, sensor_only = spec.sensor_only, "NodeState::new: called");
        Self {
            spec,
            latest_temp_c: None,
            threshold_state: ThresholdState::Nominal,
            valve_open: false,
            assisting_for: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.spec.id
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn is_sensor_only(&self) -> bool {
        self.spec.sensor_only
    }

    pub fn latest_temp_c(&self) -> Option<f64> {
        self.latest_temp_c
    }

    pub fn threshold_state(&self) -> ThresholdState {
        self.threshold_state
    }

    pub fn valve_open(&self) -> bool {
        self.valve_open
    }

    pub fn assisting_for(&self) -> Option<NodeId> {
        self.assisting_for
    }

    /// Valve is open for this node's own benefit rather than as a helper
    pub fn open_for_self(&self) -> bool {
        self.valve_open && self.assisting_for.is_none()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.spec.id,
            sensor_only: self.spec.sensor_only,
            latest_temp_c: self.latest_temp_c,
            threshold_state: self.threshold_state,
            valve_open: self.valve_open,
            assisting_for: self.assisting_for,
        }
    }

    /// Record a reading and evaluate the threshold transition
    ///
    /// Alerts are edge-triggered: staying in Hot or Cold raises nothing new.
    /// A jump straight across the band counts as stabilizing and then
    /// crossing the other threshold.
    pub fn observe(&mut self, temp_c: f64, thresholds: &Thresholds) -> Observation {
        let previous = self.threshold_state;
        let current = thresholds.classify(temp_c);
        debug!(node_id = %self.spec.id, temp_c, %previous, %current, "NodeState::observe: called");

        self.latest_temp_c = Some(temp_c);
        self.threshold_state = current;

        let left_band = previous != current && !previous.is_nominal();
        let stabilized = left_band && (self.open_for_self() || self.spec.sensor_only);

        let raised = if previous == current {
            None
        } else {
            match current {
                ThresholdState::TooHot => Some(AlertKind::Hot),
                ThresholdState::TooCold => Some(AlertKind::Cold),
                ThresholdState::Nominal => None,
            }
        };

        // A close that failed on an earlier cycle is retried while nominal
        let close_own_valve = self.open_for_self() && (current.is_nominal() || left_band);

        Observation {
            previous,
            current,
            stabilized,
            raised,
            close_own_valve,
        }
    }

    /// Decide whether a command needs the motor
    pub fn plan(&self, command: ValveCommand) -> Actuation {
        match command {
            ValveCommand::Open { .. } if self.valve_open => Actuation::Skip,
            ValveCommand::Open { .. } => Actuation::Open,
            ValveCommand::Close if !self.valve_open => Actuation::Skip,
            ValveCommand::Close | ValveCommand::ForceClose { .. } => Actuation::Close,
        }
    }

    /// Apply the result of a successful actuation (or a skipped one)
    pub fn commit(&mut self, command: ValveCommand) {
        debug!(node_id = %self.spec.id, %command, "NodeState::commit: called");
        match command {
            ValveCommand::Open { on_behalf_of } => {
                if !self.valve_open {
                    self.assisting_for = on_behalf_of;
                }
                self.valve_open = true;
            }
            ValveCommand::Close | ValveCommand::ForceClose { .. } => {
                self.valve_open = false;
                self.assisting_for = None;
            }
        }
    }

    /// Apply a failed actuation
    ///
    /// A failed open leaves the valve closed. A failed forced close means the
    /// position is unknown, so the valve is treated as still open for the
    /// node it was helping.
    pub fn fail(&mut self, command: ValveCommand) {
        debug!(node_id = %self.spec.id, %command, "NodeState::fail: called");
        if let ValveCommand::ForceClose { on_behalf_of } = command {
            self.valve_open = true;
            self.assisting_for = on_behalf_of;
        }
    }

    /// Own valve closed locally after stabilizing
    pub fn own_valve_closed(&mut self) {
        self.valve_open = false;
    }
}

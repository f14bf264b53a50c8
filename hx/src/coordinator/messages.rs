//! Message and report types for the Coordinator

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::domain::NodeId;
use crate::error::CommandError;

/// Control requests to the Coordinator task
///
/// Alerts do not travel here; they go through the alert queue.
#[derive(Debug)]
pub enum CoordRequest {
    /// Copy of the ledger and the awaiting-assistance set
    Snapshot {
        reply_tx: oneshot::Sender<CoordinatorSnapshot>,
    },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Process every alert queued so far, then reply with how many were handled
    Flush { reply_tx: oneshot::Sender<usize> },

    /// Retry closing helpers retained after failed settlements
    SettlePending {
        reply_tx: oneshot::Sender<SettlementReport>,
    },

    /// Drain the queue, release every helper and stop
    Shutdown {
        reply_tx: oneshot::Sender<SettlementReport>,
    },
}

/// Point-in-time view of coordinator state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// Helped node to its helpers, in the order they were added
    pub ledger: BTreeMap<NodeId, Vec<NodeId>>,

    /// Distressed nodes whose last Hot or Cold alert did not get a helper
    pub awaiting: BTreeSet<NodeId>,
}

impl CoordinatorSnapshot {
    pub fn helpers_of(&self, helped: NodeId) -> &[NodeId] {
        self.ledger.get(&helped).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMetrics {
    pub alerts_received: u64,
    pub alerts_processed: u64,
    pub matches: u64,
    pub unmatched_alerts: u64,
    pub ignored_alerts: u64,
    pub open_failures: u64,
    pub close_failures: u64,
    pub settlements: u64,
    pub helpers_released: u64,
}

/// Why an alert was dropped without action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownNode,
    /// Monitoring only, never matched
    SensorOnly,
    /// The source is busy helping another node
    CommittedHelper,
    /// The source left the alerted state before the alert was processed
    Stale,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode => write!(f, "unknown node"),
            Self::SensorOnly => write!(f, "sensor-only node"),
            Self::CommittedHelper => write!(f, "node is committed as a helper"),
            Self::Stale => write!(f, "node is no longer in the alerted state"),
        }
    }
}

/// What processing one alert did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Matched { helped: NodeId, helper: NodeId },
    /// No eligible helper; the alert expires
    Unmatched { helped: NodeId },
    Ignored { source: NodeId, reason: IgnoreReason },
    /// An open command failed; nothing was recorded for the helper
    MatchFailed { helped: NodeId, error: CommandError },
    Settled(SettlementReport),
}

/// Result of releasing helpers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    /// Helpers closed and removed from the ledger, in release order
    pub released: Vec<NodeId>,
    /// Helpers that failed to close; they stay in the ledger
    pub failed: Vec<(NodeId, CommandError)>,
}

impl SettlementReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: SettlementReport) {
        self.released.extend(other.released);
        self.failed.extend(other.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActuatorError;

    #[test]
    fn test_settlement_merge() {
        let mut report = SettlementReport {
            released: vec![NodeId(0)],
            failed: vec![],
        };
        assert!(report.is_clean());

        report.merge(SettlementReport {
            released: vec![NodeId(2)],
            failed: vec![(
                NodeId(3),
                CommandError::Actuator(NodeId(3), ActuatorError::MotorFault("stall".to_string())),
            )],
        });
        assert_eq!(report.released, vec![NodeId(0), NodeId(2)]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_snapshot_serializes_with_ids() {
        let mut snapshot = CoordinatorSnapshot::default();
        snapshot.ledger.insert(NodeId(1), vec![NodeId(0)]);
        snapshot.awaiting.insert(NodeId(4));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"ledger":{"1":[0]},"awaiting":[4]}"#);
        assert_eq!(snapshot.helpers_of(NodeId(1)), &[NodeId(0)]);
        assert!(snapshot.helpers_of(NodeId(9)).is_empty());
    }
}

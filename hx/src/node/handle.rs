//! NodeHandle - the coordinator's view of a node task

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::state::{NodeSnapshot, Observation};
use crate::domain::{CommandOutcome, NodeId, ValveCommand};
use crate::error::CommandError;

/// Requests accepted by a node task
#[derive(Debug)]
pub enum NodeRequest {
    /// Execute a valve command and report the result
    Command {
        command: ValveCommand,
        reply: oneshot::Sender<Result<CommandOutcome, CommandError>>,
    },

    /// Take a sample now instead of waiting for the next tick
    PollNow {
        reply: oneshot::Sender<Option<Observation>>,
    },
}

/// Cloneable handle to a running node
///
/// Commands go over an mpsc channel and are answered on a oneshot. State is
/// read from a watch channel the node republishes after every change, so
/// reading a snapshot never waits on the node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    sensor_only: bool,
    tx: mpsc::Sender<NodeRequest>,
    snapshot: watch::Receiver<NodeSnapshot>,
}

impl NodeHandle {
    pub(crate) fn new(
        id: NodeId,
        sensor_only: bool,
        tx: mpsc::Sender<NodeRequest>,
        snapshot: watch::Receiver<NodeSnapshot>,
    ) -> Self {
        debug!(%id, "NodeHandle::new: called");
        Self {
            id,
            sensor_only,
            tx,
            snapshot,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_sensor_only(&self) -> bool {
        self.sensor_only
    }

    /// Latest published state
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Send a valve command and wait for the node to finish it
    pub async fn command(&self, command: ValveCommand) -> Result<CommandOutcome, CommandError> {
        debug!(node_id = %self.id, %command, "NodeHandle::command: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(NodeRequest::Command {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CommandError::NodeUnavailable(self.id))?;

        reply_rx.await.map_err(|_| CommandError::NodeUnavailable(self.id))?
    }

    /// Sample the sensor immediately
    ///
    /// Returns `None` when the read failed and the cycle was skipped.
    pub async fn poll_now(&self) -> Result<Option<Observation>> {
        debug!(node_id = %self.id, "NodeHandle::poll_now: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(NodeRequest::PollNow { reply: reply_tx })
            .await
            .map_err(|_| eyre!("Node {} channel closed", self.id))?;

        reply_rx
            .await
            .map_err(|_| eyre!("Node {} stopped before reply", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ThresholdState;

    fn snapshot(id: NodeId) -> NodeSnapshot {
        NodeSnapshot {
            id,
            sensor_only: false,
            latest_temp_c: Some(21.0),
            threshold_state: ThresholdState::Nominal,
            valve_open: false,
            assisting_for: None,
        }
    }

    #[tokio::test]
    async fn test_command_to_stopped_node() {
        let (tx, rx) = mpsc::channel(1);
        let (_snap_tx, snap_rx) = watch::channel(snapshot(NodeId(2)));
        drop(rx);

        let handle = NodeHandle::new(NodeId(2), false, tx, snap_rx);
        let err = handle.command(ValveCommand::Close).await.unwrap_err();
        assert_eq!(err, CommandError::NodeUnavailable(NodeId(2)));
        assert!(handle.poll_now().await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_follows_watch() {
        let (tx, _rx) = mpsc::channel(1);
        let (snap_tx, snap_rx) = watch::channel(snapshot(NodeId(5)));
        let handle = NodeHandle::new(NodeId(5), false, tx, snap_rx);

        let mut updated = snapshot(NodeId(5));
        updated.valve_open = true;
        snap_tx.send_replace(updated);

        assert!(handle.snapshot().valve_open);
    }
}

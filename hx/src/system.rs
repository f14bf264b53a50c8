//! HeatExchanger - wires nodes and the coordinator into one running system

use std::collections::{BTreeMap, HashMap};

use eyre::{Context, Result, eyre};
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::coordinator::{AlertQueue, Coordinator, CoordinatorHandle, CoordinatorMetrics, SettlementReport};
use crate::domain::NodeId;
use crate::error::ActuatorError;
use crate::hardware::NodeHardware;
use crate::node::{Node, NodeHandle, NodeTeardown};

/// What shutdown left behind
#[derive(Debug)]
pub struct TeardownReport {
    /// Helpers released by the coordinator, and those that would not close
    pub settlement: SettlementReport,
    pub metrics: CoordinatorMetrics,
    /// Valves whose final close failed and may be stuck open
    pub stuck_valves: Vec<(NodeId, ActuatorError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.stuck_valves.is_empty()
    }
}

struct NodeTask {
    id: NodeId,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<NodeTeardown>,
}

/// A running set of nodes and their coordinator
pub struct HeatExchanger {
    coordinator: CoordinatorHandle,
    coordinator_task: JoinHandle<Result<CoordinatorMetrics>>,
    nodes: BTreeMap<NodeId, NodeHandle>,
    node_tasks: Vec<NodeTask>,
}

impl HeatExchanger {
    /// Build one node per inventory entry and start everything
    ///
    /// `hardware` must hold an entry for every configured node id.
    pub async fn start(config: &Config, mut hardware: HashMap<NodeId, NodeHardware>) -> Result<Self> {
        debug!(nodes = config.nodes.len(), "HeatExchanger::start: called");
        config.validate().context("Invalid configuration")?;

        let (alert_tx, alerts) = AlertQueue::new();
        let mut pending = Vec::with_capacity(config.nodes.len());
        let mut nodes = BTreeMap::new();

        for spec in &config.nodes {
            let hw = hardware
                .remove(&spec.id)
                .ok_or_else(|| eyre!("No hardware supplied for {}", spec.id))?;
            let (node, handle) = Node::new(spec.clone(), config.thresholds, &config.node, hw, alert_tx.clone());
            nodes.insert(spec.id, handle);
            pending.push(node);
        }
        for id in hardware.keys() {
            warn!(node_id = %id, "Hardware supplied for a node not in the inventory, ignoring it");
        }

        let handles: Vec<NodeHandle> = nodes.values().cloned().collect();
        let coordinator = match &config.storage.ledger_dir {
            Some(dir) => {
                Coordinator::with_persistence(config.coordinator.clone(), handles, alert_tx, alerts, dir.clone()).await?
            }
            None => Coordinator::new(config.coordinator.clone(), handles, alert_tx, alerts),
        };
        let coordinator_handle = coordinator.handle();

        let node_tasks = pending
            .into_iter()
            .map(|node| {
                let id = node.id();
                let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
                let task = tokio::spawn(node.run(shutdown_rx));
                NodeTask { id, shutdown_tx, task }
            })
            .collect();
        let coordinator_task = tokio::spawn(coordinator.run());

        info!(nodes = nodes.len(), "Heat exchanger started");
        Ok(Self {
            coordinator: coordinator_handle,
            coordinator_task,
            nodes,
            node_tasks,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeHandle> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeHandle> {
        self.nodes.values()
    }

    /// Stop everything without leaving a valve open
    ///
    /// The coordinator stops taking alerts, drains the queue and closes every
    /// helper in the ledger. Then each node is stopped and closes its own
    /// valve. A coordinator failure is returned only after the nodes are down.
    pub async fn shutdown(self) -> Result<TeardownReport> {
        debug!("HeatExchanger::shutdown: called");

        let settlement = match self.coordinator.shutdown().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Coordinator did not complete teardown");
                SettlementReport::default()
            }
        };
        let coordinator_result = self
            .coordinator_task
            .await
            .context("Coordinator task panicked")
            .and_then(|r| r);

        for node in &self.node_tasks {
            if node.shutdown_tx.send(()).await.is_err() {
                debug!(node_id = %node.id, "Node already stopped");
            }
        }
        let results = join_all(self.node_tasks.into_iter().map(|n| n.task)).await;

        let mut stuck_valves = Vec::new();
        for result in results {
            let teardown = result.context("Node task panicked")?;
            if let Some(e) = teardown.close_error {
                error!(node_id = %teardown.id, error = %e, "Valve may be stuck open");
                stuck_valves.push((teardown.id, e));
            }
        }

        let metrics = coordinator_result?;
        info!(stuck = stuck_valves.len(), "Heat exchanger stopped");
        Ok(TeardownReport {
            settlement,
            metrics,
            stuck_valves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeSpec;
    use crate::hardware::SimulatedSensor;

    #[tokio::test]
    async fn test_start_requires_hardware_for_every_node() {
        let config = Config {
            nodes: vec![NodeSpec::new(0, "Room_A", "Sensor_1", 0)],
            ..Default::default()
        };
        let result = HeatExchanger::start(&config, HashMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = Config {
            nodes: vec![NodeSpec::new(0, "Room_A", "Sensor_1", 0).sensor_only()],
            thresholds: crate::domain::Thresholds::new(25.0, 20.0),
            ..Default::default()
        };
        let mut hardware = HashMap::new();
        hardware.insert(NodeId(0), NodeHardware::sensor_only(SimulatedSensor::new(21.0)));
        assert!(HeatExchanger::start(&config, hardware).await.is_err());
    }
}

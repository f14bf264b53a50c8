//! Node task: polling loop and command execution

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::NodeConfig;
use super::handle::{NodeHandle, NodeRequest};
use super::state::{Actuation, NodeSnapshot, NodeState, Observation};
use crate::coordinator::AlertSender;
use crate::domain::{
    Alert, AlertKind, CommandOutcome, NodeId, NodeSpec, ThresholdState, Thresholds, ValveCommand,
    celsius_to_fahrenheit,
};
use crate::error::{ActuatorError, CommandError, SensorError};
use crate::hardware::{ColorHint, NodeHardware};

/// Result of a node's shutdown pass
#[derive(Debug)]
pub struct NodeTeardown {
    pub id: NodeId,
    /// Set when the final valve close failed and the valve may be stuck open
    pub close_error: Option<ActuatorError>,
}

/// One sensor unit running as an independent task
pub struct Node {
    state: NodeState,
    thresholds: Thresholds,
    config: NodeConfig,
    hardware: NodeHardware,
    alerts: AlertSender,
    rx: mpsc::Receiver<NodeRequest>,
    snapshot_tx: watch::Sender<NodeSnapshot>,
}

impl Node {
    /// Build a node and the handle used to reach it
    pub fn new(
        spec: NodeSpec,
        thresholds: Thresholds,
        config: &NodeConfig,
        mut hardware: NodeHardware,
        alerts: AlertSender,
    ) -> (Self, NodeHandle) {
        debug!(node_id = %spec.id, room = %spec.room, name = %spec.name, "Node::new: called");

        if spec.sensor_only && (hardware.valve.is_some() || hardware.display.is_some()) {
            warn!(node_id = %spec.id, "Sensor-only node was given a valve or display, ignoring them");
            hardware.valve = None;
            hardware.display = None;
        }
        if !spec.sensor_only && hardware.valve.is_none() {
            warn!(node_id = %spec.id, "Node has no valve attached, commands will be rejected");
        }

        let state = NodeState::new(spec);
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let handle = NodeHandle::new(state.id(), state.is_sensor_only(), tx, snapshot_rx);

        let node = Self {
            state,
            thresholds,
            config: config.clone(),
            hardware,
            alerts,
            rx,
            snapshot_tx,
        };
        (node, handle)
    }

    pub fn id(&self) -> NodeId {
        self.state.id()
    }

    /// Run the node until a shutdown signal arrives or its sender is dropped
    ///
    /// On exit the node closes its own valve if it is still open and blanks
    /// the display.
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> NodeTeardown {
        let node_id = self.id();
        info!(%node_id, "Node started");

        // First sample happens before any command is served
        self.poll_once().await;

        let period = self.config.poll_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(%node_id, "Shutdown signal received");
                    break;
                }
                req = self.rx.recv(), if commands_open => {
                    match req {
                        Some(req) => self.handle_request(req).await,
                        None => {
                            debug!(%node_id, "Command channel closed");
                            commands_open = false;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }

        self.teardown().await
    }

    async fn handle_request(&mut self, req: NodeRequest) {
        match req {
            NodeRequest::Command { command, reply } => {
                let result = self.execute(command).await;
                let _ = reply.send(result);
            }
            NodeRequest::PollNow { reply } => {
                let observation = self.poll_once().await;
                let _ = reply.send(observation);
            }
        }
    }

    /// Sample the sensor once and act on the transition
    async fn poll_once(&mut self) -> Option<Observation> {
        let node_id = self.id();
        let temp_c = match self.hardware.sensor.read_celsius().await {
            Ok(t) if t.is_finite() => t,
            Ok(t) => {
                warn!(%node_id, error = %SensorError::NotFinite(t), "Skipping poll cycle");
                return None;
            }
            Err(e) => {
                warn!(%node_id, error = %e, "Skipping poll cycle");
                return None;
            }
        };

        let observation = self.state.observe(temp_c, &self.thresholds);
        if observation.previous != observation.current {
            info!(
                %node_id,
                temp_c,
                from = %observation.previous,
                to = %observation.current,
                "Threshold transition"
            );
        }

        if observation.close_own_valve {
            self.close_own_valve().await;
        }

        self.publish();
        self.show_reading(temp_c);

        for kind in observation.alerts() {
            self.raise(kind, temp_c);
        }

        Some(observation)
    }

    async fn close_own_valve(&mut self) {
        let node_id = self.id();
        match self.actuate(Actuation::Close).await {
            Ok(()) => {
                info!(%node_id, "Temperature nominal, own valve closed");
                self.state.own_valve_closed();
            }
            Err(e) => {
                warn!(%node_id, error = %e, "Failed to close own valve, will retry next cycle");
            }
        }
    }

    /// Execute a coordinator command against the valve
    async fn execute(&mut self, command: ValveCommand) -> Result<CommandOutcome, CommandError> {
        let node_id = self.id();
        debug!(%node_id, %command, "Node::execute: called");

        if self.state.is_sensor_only() || self.hardware.valve.is_none() {
            warn!(%node_id, %command, "Rejecting valve command for node without a valve");
            return Err(CommandError::SensorOnly(node_id));
        }

        let result = match self.state.plan(command) {
            Actuation::Skip => {
                info!(%node_id, %command, valve_open = self.state.valve_open(), "Valve already in target state");
                Ok(CommandOutcome::AlreadyInState)
            }
            action => match self.actuate(action).await {
                Ok(()) => {
                    self.state.commit(command);
                    Ok(CommandOutcome::Actuated)
                }
                Err(e) => {
                    warn!(%node_id, %command, error = %e, "Valve actuation failed");
                    self.state.fail(command);
                    Err(CommandError::Actuator(node_id, e))
                }
            },
        };

        self.publish();
        result
    }

    /// Drive the motor, bounded by the actuation timeout
    async fn actuate(&mut self, action: Actuation) -> Result<(), ActuatorError> {
        let limit = self.config.actuation_timeout();
        let Some(valve) = self.hardware.valve.as_mut() else {
            return Err(ActuatorError::MotorFault("no valve attached".to_string()));
        };

        let motion = async {
            match action {
                Actuation::Open => valve.open().await,
                Actuation::Close => valve.close().await,
                Actuation::Skip => Ok(()),
            }
        };

        match tokio::time::timeout(limit, motion).await {
            Ok(result) => result,
            Err(_) => Err(ActuatorError::Timeout(limit)),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }

    fn raise(&self, kind: AlertKind, temp_c: f64) {
        let node_id = self.id();
        info!(%node_id, %kind, temp_c, "Raising alert");
        if let Err(e) = self.alerts.enqueue(Alert::new(node_id, kind, temp_c)) {
            warn!(%node_id, error = %e, "Coordinator is not accepting alerts");
        }
    }

    fn show_reading(&mut self, temp_c: f64) {
        let color = match self.state.threshold_state() {
            ThresholdState::TooHot => ColorHint::Red,
            ThresholdState::TooCold => ColorHint::Blue,
            ThresholdState::Nominal => ColorHint::Green,
        };
        let text = format!("{:.1} C / {:.1} F", temp_c, celsius_to_fahrenheit(temp_c));
        self.show(&text, color);
    }

    fn show(&mut self, text: &str, color: ColorHint) {
        let node_id = self.state.id();
        if let Some(display) = self.hardware.display.as_mut()
            && let Err(e) = display.show_status(text, color)
        {
            warn!(%node_id, error = %e, "Display update failed");
        }
    }

    async fn teardown(mut self) -> NodeTeardown {
        let node_id = self.id();
        debug!(%node_id, "Node::teardown: called");

        let mut close_error = None;
        if self.state.valve_open() {
            match self.actuate(Actuation::Close).await {
                Ok(()) => {
                    info!(%node_id, "Valve closed on shutdown");
                    self.state.commit(ValveCommand::Close);
                }
                Err(e) => {
                    warn!(%node_id, error = %e, "Valve close failed on shutdown, valve may be stuck open");
                    close_error = Some(e);
                }
            }
        }

        self.show("", ColorHint::Off);
        self.publish();
        info!(%node_id, "Node stopped");

        NodeTeardown { id: node_id, close_error }
    }
}

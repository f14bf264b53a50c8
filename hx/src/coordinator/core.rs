//! Main Coordinator task implementation
//!
//! The [`Dispatcher`] owns the favor ledger and is the only issuer of
//! cross-node commands. Each alert is processed to completion, including
//! every command it causes and the ledger update, before the next one is
//! taken off the queue. The [`Coordinator`] wraps it in an actor loop that
//! also serves control requests from [`CoordinatorHandle`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::ledger::FavorLedger;
use super::matching::{Candidate, select_helper};
use super::messages::{
    AlertOutcome, CoordRequest, CoordinatorMetrics, CoordinatorSnapshot, IgnoreReason, SettlementReport,
};
use super::persistence::{LedgerEvent, LedgerJournal};
use super::queue::{AlertQueue, AlertSender, Dequeued};
use crate::domain::{Alert, AlertKind, CommandOutcome, NodeId, ThresholdState, ValveCommand};
use crate::error::{CommandError, LedgerError};
use crate::node::NodeHandle;

/// Alert processing and ledger bookkeeping
pub struct Dispatcher {
    nodes: BTreeMap<NodeId, NodeHandle>,
    ledger: FavorLedger,
    awaiting: BTreeSet<NodeId>,
    journal: Option<LedgerJournal>,
    metrics: CoordinatorMetrics,
}

impl Dispatcher {
    pub fn new(nodes: impl IntoIterator<Item = NodeHandle>) -> Self {
        let nodes: BTreeMap<NodeId, NodeHandle> = nodes.into_iter().map(|n| (n.id(), n)).collect();
        debug!(count = nodes.len(), "Dispatcher::new: called");
        Self {
            nodes,
            ledger: FavorLedger::new(),
            awaiting: BTreeSet::new(),
            journal: None,
            metrics: CoordinatorMetrics::default(),
        }
    }

    /// Attach a journal and load the ledger it describes
    pub async fn with_journal(mut self, journal: LedgerJournal) -> Result<Self> {
        debug!(path = ?journal.path(), "Dispatcher::with_journal: called");
        self.ledger = journal.replay().await.context("Failed to replay ledger journal")?;
        if !self.ledger.is_empty() {
            info!(
                helped = self.ledger.len(),
                helpers = self.ledger.helper_count(),
                "Recovered favor ledger from journal"
            );
        }
        self.journal = Some(journal);
        Ok(self)
    }

    pub fn ledger(&self) -> &FavorLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            ledger: self.ledger.entries().clone(),
            awaiting: self.awaiting.clone(),
        }
    }

    /// Force-close every helper left in a recovered ledger
    ///
    /// The actuator is sent a close even if the node believes its valve is
    /// already closed. Helpers that fail stay in the ledger and their node
    /// marks the valve open.
    pub async fn recover(&mut self) -> Result<SettlementReport> {
        debug!(helpers = self.ledger.helper_count(), "Dispatcher::recover: called");
        let mut report = SettlementReport::default();

        for helped in self.ledger.helped_nodes() {
            for helper in self.ledger.helpers_of(helped).to_vec() {
                let command = ValveCommand::ForceClose {
                    on_behalf_of: Some(helped),
                };
                match self.command(helper, command).await {
                    Ok(_) => {
                        info!(%helped, %helper, "Recovered helper valve closed");
                        self.release(helped, helper).await;
                        report.released.push(helper);
                    }
                    Err(e @ (CommandError::SensorOnly(_) | CommandError::NodeUnavailable(_)))
                        if !self.can_actuate(helper) =>
                    {
                        warn!(%helped, %helper, error = %e, "Dropping recovered helper without a valve");
                        self.release(helped, helper).await;
                    }
                    Err(e) => {
                        warn!(%helped, %helper, error = %e, "Recovered helper failed to close, keeping it in the ledger");
                        self.metrics.close_failures += 1;
                        report.failed.push((helper, e));
                    }
                }
            }
        }

        self.check_consistency()?;
        Ok(report)
    }

    /// Process one alert to completion
    ///
    /// Errors only on a ledger invariant violation, which is fatal.
    pub async fn process(&mut self, alert: Alert) -> Result<AlertOutcome> {
        debug!(source = %alert.source, kind = %alert.kind, temp_c = alert.observed_temp_c, "Dispatcher::process: called");
        self.metrics.alerts_received += 1;

        let outcome = match alert.kind {
            AlertKind::Hot | AlertKind::Cold => self.handle_distress(alert).await?,
            AlertKind::Stabilized => AlertOutcome::Settled(self.handle_stabilized(alert.source).await),
        };

        self.prune_awaiting();
        self.check_consistency()?;
        self.metrics.alerts_processed += 1;
        Ok(outcome)
    }

    async fn handle_distress(&mut self, alert: Alert) -> Result<AlertOutcome, LedgerError> {
        let helped = alert.source;

        let reason = match self.nodes.get(&helped) {
            None => Some(IgnoreReason::UnknownNode),
            Some(node) if node.is_sensor_only() => Some(IgnoreReason::SensorOnly),
            Some(_) if self.ledger.helping(helped).is_some() => Some(IgnoreReason::CommittedHelper),
            Some(node) if !Self::still_alerting(node, alert.kind) => Some(IgnoreReason::Stale),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            info!(source = %helped, kind = %alert.kind, %reason, "Ignoring alert");
            if reason == IgnoreReason::Stale {
                self.awaiting.remove(&helped);
            }
            self.metrics.ignored_alerts += 1;
            return Ok(AlertOutcome::Ignored { source: helped, reason });
        }

        let candidates = self.candidates(helped);
        let Some(helper) = select_helper(alert.kind, helped, alert.observed_temp_c, &candidates) else {
            warn!(
                %helped,
                kind = %alert.kind,
                temp_c = alert.observed_temp_c,
                candidates = candidates.len(),
                "No eligible helper, alert expires"
            );
            self.metrics.unmatched_alerts += 1;
            self.awaiting.insert(helped);
            return Ok(AlertOutcome::Unmatched { helped });
        };

        info!(%helped, %helper, kind = %alert.kind, "Matched helper");

        // Helped node first; the helper is only commanded once that succeeded
        if let Err(e) = self.command(helped, ValveCommand::open_for_self()).await {
            warn!(%helped, %helper, error = %e, "Helped node failed to open, match aborted");
            self.metrics.open_failures += 1;
            self.awaiting.insert(helped);
            return Ok(AlertOutcome::MatchFailed { helped, error: e });
        }

        if let Err(e) = self.command(helper, ValveCommand::open_for(helped)).await {
            warn!(%helped, %helper, error = %e, "Helper failed to open, nothing recorded");
            self.metrics.open_failures += 1;
            self.awaiting.insert(helped);
            return Ok(AlertOutcome::MatchFailed { helped, error: e });
        }

        if self.ledger.record(helped, helper)? {
            self.journal(LedgerEvent::assisted(helped, helper)).await;
        } else {
            debug!(%helped, %helper, "Helper already recorded");
        }
        self.awaiting.remove(&helped);
        self.metrics.matches += 1;

        // Back in band while its valve was opening: no Stabilized will follow
        if self.nodes.get(&helped).is_some_and(|n| n.snapshot().threshold_state.is_nominal()) {
            info!(%helped, "Helped node stabilized during the match, releasing helpers");
            self.settle(helped).await;
        }
        Ok(AlertOutcome::Matched { helped, helper })
    }

    /// Whether the node is still in the state the alert reported
    fn still_alerting(node: &NodeHandle, kind: AlertKind) -> bool {
        let state = node.snapshot().threshold_state;
        match kind {
            AlertKind::Hot => state == ThresholdState::TooHot,
            AlertKind::Cold => state == ThresholdState::TooCold,
            AlertKind::Stabilized => state.is_nominal(),
        }
    }

    async fn handle_stabilized(&mut self, helped: NodeId) -> SettlementReport {
        self.awaiting.remove(&helped);
        if !self.ledger.is_helped(helped) {
            debug!(%helped, "Stabilized with no helpers");
            return SettlementReport::default();
        }
        self.settle(helped).await
    }

    /// Close every helper of `helped` in the order they were added
    ///
    /// Every close is attempted. Helpers that fail stay in the ledger.
    pub async fn settle(&mut self, helped: NodeId) -> SettlementReport {
        let helpers = self.ledger.helpers_of(helped).to_vec();
        debug!(%helped, ?helpers, "Dispatcher::settle: called");
        let mut report = SettlementReport::default();

        for helper in helpers {
            match self.command(helper, ValveCommand::Close).await {
                Ok(outcome) => {
                    if outcome == CommandOutcome::AlreadyInState {
                        warn!(%helped, %helper, "Helper valve was already closed");
                    }
                    self.release(helped, helper).await;
                    report.released.push(helper);
                }
                Err(e) => {
                    warn!(%helped, %helper, error = %e, "Helper failed to close, keeping it in the ledger");
                    self.metrics.close_failures += 1;
                    report.failed.push((helper, e));
                }
            }
        }

        self.metrics.settlements += 1;
        info!(
            %helped,
            released = report.released.len(),
            failed = report.failed.len(),
            "Settlement complete"
        );
        report
    }

    /// Retry every entry still in the ledger
    pub async fn settle_pending(&mut self) -> Result<SettlementReport> {
        debug!(pending = self.ledger.len(), "Dispatcher::settle_pending: called");
        let mut report = SettlementReport::default();
        for helped in self.ledger.helped_nodes() {
            report.merge(self.settle(helped).await);
        }
        self.check_consistency()?;
        Ok(report)
    }

    /// Release everything before shutdown
    pub async fn teardown(&mut self) -> Result<SettlementReport> {
        debug!("Dispatcher::teardown: called");
        let report = self.settle_pending().await?;
        self.awaiting.clear();
        if !report.is_clean() {
            error!(stuck = report.failed.len(), "Helpers still open after teardown");
        }
        Ok(report)
    }

    /// Rewrite the journal to the live ledger
    pub async fn compact_journal(&self) {
        if let Some(journal) = &self.journal
            && let Err(e) = journal.compact(&self.ledger).await
        {
            warn!(error = %e, "Failed to compact ledger journal");
        }
    }

    /// Verify the ledger against itself and against node valve states
    pub fn check_consistency(&self) -> Result<(), LedgerError> {
        let result = self.ledger.verify().and_then(|()| {
            for helpers in self.ledger.entries().values() {
                for helper in helpers {
                    let open = self.nodes.get(helper).is_some_and(|n| n.snapshot().valve_open);
                    if !open {
                        return Err(LedgerError::ClosedHelper(*helper));
                    }
                }
            }
            Ok(())
        });
        if let Err(e) = &result {
            error!(error = %e, ledger = ?self.ledger.entries(), "Favor ledger invariant violated");
        }
        result
    }

    /// Nodes that may help `helped` right now, with their latest readings
    fn candidates(&self, helped: NodeId) -> Vec<Candidate> {
        self.nodes
            .values()
            .filter(|n| n.id() != helped && !n.is_sensor_only())
            .filter_map(|n| {
                let snap = n.snapshot();
                let committed_elsewhere = self.ledger.helping(n.id()).is_some_and(|h| h != helped);
                let busy_valve = snap.valve_open && snap.assisting_for != Some(helped);
                let eligible = !committed_elsewhere
                    && !busy_valve
                    && !self.ledger.is_helped(n.id())
                    && snap.threshold_state.is_nominal();
                match snap.latest_temp_c {
                    Some(temp_c) if eligible => Some(Candidate { id: n.id(), temp_c }),
                    _ => None,
                }
            })
            .collect()
    }

    fn can_actuate(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| !n.is_sensor_only())
    }

    async fn command(&self, id: NodeId, command: ValveCommand) -> Result<CommandOutcome, CommandError> {
        match self.nodes.get(&id) {
            Some(node) => node.command(command).await,
            None => Err(CommandError::NodeUnavailable(id)),
        }
    }

    async fn release(&mut self, helped: NodeId, helper: NodeId) {
        if self.ledger.release(helped, helper) {
            self.metrics.helpers_released += 1;
            self.journal(LedgerEvent::released(helped, helper)).await;
        }
    }

    async fn journal(&self, event: LedgerEvent) {
        if let Some(journal) = &self.journal
            && let Err(e) = journal.append(&event).await
        {
            warn!(error = %e, kind = ?event.kind, "Failed to journal ledger change");
        }
    }

    /// Drop awaiting entries for nodes that are back in band
    fn prune_awaiting(&mut self) {
        let nodes = &self.nodes;
        self.awaiting.retain(|id| {
            nodes
                .get(id)
                .is_some_and(|n| !n.snapshot().threshold_state.is_nominal())
        });
    }
}

/// The Coordinator task: drains the alert queue and serves control requests
pub struct Coordinator {
    config: CoordinatorConfig,
    dispatcher: Dispatcher,
    alerts: AlertQueue,
    alert_tx: AlertSender,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
}

impl Coordinator {
    /// Create a Coordinator over the given nodes
    ///
    /// `alert_tx` must be a sender for `alerts`; handles use it to submit.
    pub fn new(
        config: CoordinatorConfig,
        nodes: impl IntoIterator<Item = NodeHandle>,
        alert_tx: AlertSender,
        alerts: AlertQueue,
    ) -> Self {
        debug!("Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.request_buffer.max(1));
        Self {
            config,
            dispatcher: Dispatcher::new(nodes),
            alerts,
            alert_tx,
            tx,
            rx,
        }
    }

    /// Create a Coordinator whose ledger is journaled under `dir`
    pub async fn with_persistence(
        config: CoordinatorConfig,
        nodes: impl IntoIterator<Item = NodeHandle>,
        alert_tx: AlertSender,
        alerts: AlertQueue,
        dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut coordinator = Self::new(config, nodes, alert_tx, alerts);
        coordinator.dispatcher = coordinator
            .dispatcher
            .with_journal(LedgerJournal::new(dir))
            .await?;
        Ok(coordinator)
    }

    /// Create a handle for observing and controlling the Coordinator
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), self.alert_tx.clone())
    }

    /// Run the coordinator loop
    ///
    /// Control requests are served between alerts, never in the middle of
    /// one. Returns the final metrics after shutdown, or an error if the
    /// ledger invariant was violated.
    pub async fn run(mut self) -> Result<CoordinatorMetrics> {
        info!(nodes = self.dispatcher.nodes.len(), "Coordinator started");

        if !self.dispatcher.ledger().is_empty() {
            let report = self.dispatcher.recover().await?;
            info!(
                released = report.released.len(),
                failed = report.failed.len(),
                "Recovered ledger reconciled"
            );
        }
        if self.config.compact_journal {
            self.dispatcher.compact_journal().await;
        }

        // The coordinator keeps its own sender, so the queue only closes at shutdown
        loop {
            tokio::select! {
                biased;

                req = self.rx.recv() => {
                    let Some(req) = req else {
                        debug!("Request channel closed");
                        break;
                    };
                    if self.handle_request(req).await? {
                        break;
                    }
                }

                Some(alert) = self.alerts.next() => {
                    self.dispatcher.process(alert).await?;
                }
            }
        }

        let metrics = self.dispatcher.metrics().clone();
        info!(?metrics, "Coordinator stopped");
        Ok(metrics)
    }

    /// Serve one control request; returns true once the coordinator should stop
    async fn handle_request(&mut self, req: CoordRequest) -> Result<bool> {
        match req {
            CoordRequest::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.dispatcher.snapshot());
            }
            CoordRequest::GetMetrics { reply_tx } => {
                let _ = reply_tx.send(self.dispatcher.metrics().clone());
            }
            CoordRequest::Flush { reply_tx } => {
                let count = self.drain().await?;
                debug!(count, "Flushed alert queue");
                let _ = reply_tx.send(count);
            }
            CoordRequest::SettlePending { reply_tx } => {
                let report = self.dispatcher.settle_pending().await?;
                let _ = reply_tx.send(report);
            }
            CoordRequest::Shutdown { reply_tx } => {
                info!("Coordinator shutting down");
                let report = self.shutdown().await?;
                let _ = reply_tx.send(report);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Process everything currently queued
    async fn drain(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Dequeued::Alert(alert) = self.alerts.dequeue() {
            self.dispatcher.process(alert).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn shutdown(&mut self) -> Result<SettlementReport> {
        self.alerts.close();
        let drained = self.drain().await?;
        debug!(drained, "Processed remaining alerts before teardown");

        let report = self.dispatcher.teardown().await?;
        if self.config.compact_journal {
            self.dispatcher.compact_journal().await;
        }
        Ok(report)
    }
}

//! CoordinatorHandle - client interface to the Coordinator task

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordRequest, CoordinatorMetrics, CoordinatorSnapshot, SettlementReport};
use super::queue::AlertSender;
use crate::domain::Alert;
use crate::error::QueueClosed;

/// Handle for observing and controlling the Coordinator
///
/// Cloneable. Alerts are submitted straight into the alert queue; every
/// other operation is a request answered on a oneshot.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordRequest>,
    alerts: AlertSender,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, alerts: AlertSender) -> Self {
        debug!("CoordinatorHandle::new: called");
        Self { tx, alerts }
    }

    /// Enqueue an alert as if a node had raised it
    pub fn submit(&self, alert: Alert) -> Result<(), QueueClosed> {
        debug!(source = %alert.source, kind = %alert.kind, "CoordinatorHandle::submit: called");
        self.alerts.enqueue(alert)
    }

    /// Current ledger and awaiting-assistance set
    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot> {
        debug!("CoordinatorHandle::snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Snapshot { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator dropped snapshot request"))
    }

    /// Get current metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics> {
        debug!("CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator dropped metrics request"))
    }

    /// Wait until every alert queued before this call has been processed
    ///
    /// Returns how many alerts the flush itself processed.
    pub async fn flush(&self) -> Result<usize> {
        debug!("CoordinatorHandle::flush: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Flush { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator stopped during flush"))
    }

    /// Retry closing helpers left in the ledger by failed settlements
    pub async fn settle_pending(&self) -> Result<SettlementReport> {
        debug!("CoordinatorHandle::settle_pending: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::SettlePending { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator stopped during settlement"))
    }

    /// Stop accepting alerts, drain the queue and release every helper
    pub async fn shutdown(&self) -> Result<SettlementReport> {
        debug!("CoordinatorHandle::shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Shutdown { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator stopped before teardown finished"))
    }
}

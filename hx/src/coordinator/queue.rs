//! Alert queue between nodes and the coordinator
//!
//! Unbounded FIFO: any number of nodes enqueue concurrently, the coordinator
//! is the single consumer. The underlying channel gives one global order of
//! enqueues, so alerts come out exactly in the order they went in.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::Alert;
use crate::error::QueueClosed;

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

/// Result of a non-blocking dequeue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dequeued {
    Alert(Alert),
    /// Nothing queued right now
    Empty,
    /// Every sender is gone and the queue is drained
    Closed,
}

/// Producer side, cloned into every node
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: mpsc::UnboundedSender<Alert>,
    counters: Arc<Counters>,
}

impl AlertSender {
    /// Append an alert to the back of the queue
    pub fn enqueue(&self, alert: Alert) -> Result<(), QueueClosed> {
        debug!(source = %alert.source, kind = %alert.kind, "AlertSender::enqueue: called");
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        self.tx.send(alert).map_err(|e| {
            self.counters.enqueued.fetch_sub(1, Ordering::SeqCst);
            QueueClosed(e.0)
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the coordinator
#[derive(Debug)]
pub struct AlertQueue {
    rx: mpsc::UnboundedReceiver<Alert>,
    counters: Arc<Counters>,
}

impl AlertQueue {
    /// Create a queue and its first sender
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (AlertSender, AlertQueue) {
        debug!("AlertQueue::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        (
            AlertSender {
                tx,
                counters: counters.clone(),
            },
            AlertQueue { rx, counters },
        )
    }

    /// Remove and return the oldest alert without waiting
    pub fn dequeue(&mut self) -> Dequeued {
        match self.rx.try_recv() {
            Ok(alert) => {
                self.counters.dequeued.fetch_add(1, Ordering::SeqCst);
                Dequeued::Alert(alert)
            }
            Err(mpsc::error::TryRecvError::Empty) => Dequeued::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => Dequeued::Closed,
        }
    }

    /// Wait for the next alert; `None` once every sender is gone
    pub async fn next(&mut self) -> Option<Alert> {
        let alert = self.rx.recv().await?;
        self.counters.dequeued.fetch_add(1, Ordering::SeqCst);
        Some(alert)
    }

    /// Refuse new alerts; already queued ones can still be dequeued
    pub fn close(&mut self) {
        debug!("AlertQueue::close: called");
        self.rx.close();
    }

    /// Total alerts accepted so far
    pub fn enqueued(&self) -> u64 {
        self.counters.enqueued.load(Ordering::SeqCst)
    }

    /// Total alerts handed to the consumer so far
    pub fn dequeued(&self) -> u64 {
        self.counters.dequeued.load(Ordering::SeqCst)
    }

    /// Alerts waiting to be dequeued
    pub fn len(&self) -> usize {
        self.enqueued().saturating_sub(self.dequeued()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;

    #[test]
    fn test_fifo_order() {
        let (tx, mut queue) = AlertQueue::new();
        tx.enqueue(Alert::hot(NodeId(1), 25.0)).unwrap();
        tx.enqueue(Alert::cold(NodeId(2), 18.0)).unwrap();
        tx.enqueue(Alert::stabilized(NodeId(1), 22.0)).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Dequeued::Alert(Alert::hot(NodeId(1), 25.0)));
        assert_eq!(queue.dequeue(), Dequeued::Alert(Alert::cold(NodeId(2), 18.0)));
        assert_eq!(queue.dequeue(), Dequeued::Alert(Alert::stabilized(NodeId(1), 22.0)));
        assert_eq!(queue.dequeue(), Dequeued::Empty);
        assert_eq!(queue.enqueued(), 3);
        assert_eq!(queue.dequeued(), 3);
    }

    #[test]
    fn test_closed_after_senders_dropped() {
        let (tx, mut queue) = AlertQueue::new();
        tx.enqueue(Alert::hot(NodeId(1), 25.0)).unwrap();
        drop(tx);

        assert!(matches!(queue.dequeue(), Dequeued::Alert(_)));
        assert_eq!(queue.dequeue(), Dequeued::Closed);
    }

    #[test]
    fn test_enqueue_after_close_fails() {
        let (tx, mut queue) = AlertQueue::new();
        queue.close();

        let err = tx.enqueue(Alert::hot(NodeId(1), 25.0)).unwrap_err();
        assert_eq!(err.0.source, NodeId(1));
        assert_eq!(queue.enqueued(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers_keep_per_source_order() {
        let (tx, mut queue) = AlertQueue::new();
        let mut tasks = Vec::new();
        for id in 0..4u32 {
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    tx.enqueue(Alert::hot(NodeId(id), i as f64)).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(tx);

        let mut last = [-1.0f64; 4];
        let mut count = 0;
        while let Some(alert) = queue.next().await {
            let idx = alert.source.get() as usize;
            assert!(alert.observed_temp_c > last[idx]);
            last[idx] = alert.observed_temp_c;
            count += 1;
        }
        assert_eq!(count, 200);
        assert!(queue.is_empty());
    }
}

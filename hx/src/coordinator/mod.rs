//! Coordinator - alert dispatch, helper matching and the favor ledger
//!
//! Nodes push alerts into the [`AlertQueue`]; the [`Coordinator`] task takes
//! them off one at a time, matches distressed nodes with helpers, commands
//! valves through each node's handle and keeps the [`FavorLedger`] of who is
//! helping whom. The ledger can be journaled to disk for crash recovery.

mod config;
mod core;
mod handle;
mod ledger;
mod matching;
mod messages;
mod persistence;
mod queue;

pub use config::CoordinatorConfig;
pub use core::{Coordinator, Dispatcher};
pub use handle::CoordinatorHandle;
pub use ledger::FavorLedger;
pub use matching::{Candidate, select_helper};
pub use messages::{
    AlertOutcome, CoordRequest, CoordinatorMetrics, CoordinatorSnapshot, IgnoreReason, SettlementReport,
};
pub use persistence::{LedgerEvent, LedgerEventKind, LedgerJournal};
pub use queue::{AlertQueue, AlertSender, Dequeued};

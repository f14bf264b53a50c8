//! Favor ledger journal for crash recovery
//!
//! Every ledger change is appended to a JSONL file. On restart the journal is
//! replayed into a ledger so valves left open for others can be force-closed.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ledger::FavorLedger;
use crate::domain::NodeId;

const JOURNAL_FILE: &str = "favor_ledger.jsonl";

/// What happened to a helper/helped pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerEventKind {
    /// Helper opened its valve for the helped node
    Assisted,
    /// Helper closed its valve and left the ledger
    Released,
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEvent {
    pub id: String,
    pub kind: LedgerEventKind,
    pub helped: NodeId,
    pub helper: NodeId,
    /// Unix seconds
    pub recorded_at: i64,
}

fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl LedgerEvent {
    fn new(kind: LedgerEventKind, helped: NodeId, helper: NodeId) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            helped,
            helper,
            recorded_at: now_timestamp(),
        }
    }

    pub fn assisted(helped: NodeId, helper: NodeId) -> Self {
        Self::new(LedgerEventKind::Assisted, helped, helper)
    }

    pub fn released(helped: NodeId, helper: NodeId) -> Self {
        Self::new(LedgerEventKind::Released, helped, helper)
    }
}

/// Append-only journal of ledger changes
#[derive(Debug, Clone)]
pub struct LedgerJournal {
    dir: PathBuf,
}

impl LedgerJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(?dir, "LedgerJournal::new: called");
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create ledger directory {}", self.dir.display()))
    }

    /// Append one event
    pub async fn append(&self, event: &LedgerEvent) -> Result<()> {
        debug!(id = %event.id, kind = ?event.kind, helped = %event.helped, helper = %event.helper, "LedgerJournal::append: called");
        self.ensure_dir().await?;

        let line = serde_json::to_string(event)? + "\n";
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .await
            .context("Failed to open ledger journal")?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// All readable events in file order; corrupt lines are skipped
    pub async fn load(&self) -> Result<Vec<LedgerEvent>> {
        debug!("LedgerJournal::load: called");
        let path = self.path();
        if !path.exists() {
            debug!("LedgerJournal::load: journal does not exist");
            return Ok(vec![]);
        }

        let content = fs::read_to_string(&path).await.context("Failed to read ledger journal")?;
        let mut events = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = lineno + 1, error = %e, "LedgerJournal::load: skipping corrupt line"),
            }
        }
        debug!(count = events.len(), "LedgerJournal::load: returning events");
        Ok(events)
    }

    /// Rebuild the ledger the journal describes
    pub async fn replay(&self) -> Result<FavorLedger> {
        debug!("LedgerJournal::replay: called");
        let mut ledger = FavorLedger::new();
        for event in self.load().await? {
            match event.kind {
                LedgerEventKind::Assisted => {
                    if let Err(e) = ledger.record(event.helped, event.helper) {
                        warn!(id = %event.id, error = %e, "LedgerJournal::replay: ignoring inconsistent event");
                    }
                }
                LedgerEventKind::Released => {
                    ledger.release(event.helped, event.helper);
                }
            }
        }
        Ok(ledger)
    }

    /// Rewrite the journal so it holds only the live entries of `ledger`
    pub async fn compact(&self, ledger: &FavorLedger) -> Result<usize> {
        debug!(helpers = ledger.helper_count(), "LedgerJournal::compact: called");
        self.ensure_dir().await?;

        let mut content = String::new();
        let mut count = 0;
        for (helped, helpers) in ledger.entries() {
            for helper in helpers {
                content.push_str(&serde_json::to_string(&LedgerEvent::assisted(*helped, *helper))?);
                content.push('\n');
                count += 1;
            }
        }
        fs::write(self.path(), content)
            .await
            .context("Failed to rewrite ledger journal")?;
        Ok(count)
    }

    /// Remove the journal file
    pub async fn clear(&self) -> Result<()> {
        debug!("LedgerJournal::clear: called");
        let path = self.path();
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = tempdir().unwrap();
        let journal = LedgerJournal::new(temp.path());

        journal.append(&LedgerEvent::assisted(NodeId(1), NodeId(0))).await.unwrap();
        journal.append(&LedgerEvent::assisted(NodeId(1), NodeId(2))).await.unwrap();
        journal.append(&LedgerEvent::released(NodeId(1), NodeId(0))).await.unwrap();

        assert_eq!(journal.load().await.unwrap().len(), 3);

        let ledger = journal.replay().await.unwrap();
        assert_eq!(ledger.helpers_of(NodeId(1)), &[NodeId(2)]);
        assert_eq!(ledger.helper_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_journal_is_empty() {
        let temp = tempdir().unwrap();
        let journal = LedgerJournal::new(temp.path().join("nested"));

        assert!(journal.load().await.unwrap().is_empty());
        assert!(journal.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_lines_skipped() {
        let temp = tempdir().unwrap();
        let journal = LedgerJournal::new(temp.path());
        journal.append(&LedgerEvent::assisted(NodeId(3), NodeId(4))).await.unwrap();

        let mut content = std::fs::read_to_string(journal.path()).unwrap();
        content.push_str("{not json\n");
        std::fs::write(journal.path(), content).unwrap();
        journal.append(&LedgerEvent::assisted(NodeId(3), NodeId(5))).await.unwrap();

        let ledger = journal.replay().await.unwrap();
        assert_eq!(ledger.helpers_of(NodeId(3)), &[NodeId(4), NodeId(5)]);
    }

    #[tokio::test]
    async fn test_compact_keeps_live_entries() {
        let temp = tempdir().unwrap();
        let journal = LedgerJournal::new(temp.path());
        for helper in [0, 2, 4] {
            journal.append(&LedgerEvent::assisted(NodeId(1), NodeId(helper))).await.unwrap();
        }
        journal.append(&LedgerEvent::released(NodeId(1), NodeId(2))).await.unwrap();

        let ledger = journal.replay().await.unwrap();
        assert_eq!(journal.compact(&ledger).await.unwrap(), 2);

        let events = journal.load().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == LedgerEventKind::Assisted));
        assert_eq!(journal.replay().await.unwrap().helpers_of(NodeId(1)), &[NodeId(0), NodeId(4)]);

        journal.clear().await.unwrap();
        assert!(!journal.path().exists());
    }
}

//! Favor ledger: who is currently helping whom
//!
//! Maps a helped node to the helpers whose valves were opened on its behalf,
//! in the order assistance began. A reverse index enforces that a helper is
//! listed under at most one helped node.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::domain::NodeId;
use crate::error::LedgerError;

#[derive(Debug, Clone, Default)]
pub struct FavorLedger {
    entries: BTreeMap<NodeId, Vec<NodeId>>,
    helping: HashMap<NodeId, NodeId>,
}

impl FavorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `helper` opened its valve for `helped`
    ///
    /// Returns `Ok(false)` when the pair is already recorded.
    pub fn record(&mut self, helped: NodeId, helper: NodeId) -> Result<bool, LedgerError> {
        debug!(%helped, %helper, "FavorLedger::record: called");
        if helped == helper {
            return Err(LedgerError::SelfAssist(helper));
        }
        match self.helping.get(&helper) {
            Some(existing) if *existing == helped => return Ok(false),
            Some(existing) => {
                return Err(LedgerError::HelperCommitted {
                    helper,
                    existing: *existing,
                    requested: helped,
                });
            }
            None => {}
        }
        if self.entries.contains_key(&helper) {
            return Err(LedgerError::ChainedAssist(helper));
        }
        if self.helping.contains_key(&helped) {
            return Err(LedgerError::ChainedAssist(helped));
        }

        self.entries.entry(helped).or_default().push(helper);
        self.helping.insert(helper, helped);
        Ok(true)
    }

    /// Helpers of `helped` in the order they were added
    pub fn helpers_of(&self, helped: NodeId) -> &[NodeId] {
        self.entries.get(&helped).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The node `helper` is currently helping, if any
    pub fn helping(&self, helper: NodeId) -> Option<NodeId> {
        self.helping.get(&helper).copied()
    }

    /// Whether `node` has an entry as a helped node
    pub fn is_helped(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    /// Remove one helper; the entry goes away with its last helper
    pub fn release(&mut self, helped: NodeId, helper: NodeId) -> bool {
        debug!(%helped, %helper, "FavorLedger::release: called");
        let Some(helpers) = self.entries.get_mut(&helped) else {
            return false;
        };
        let Some(pos) = helpers.iter().position(|h| *h == helper) else {
            return false;
        };
        helpers.remove(pos);
        if helpers.is_empty() {
            self.entries.remove(&helped);
        }
        self.helping.remove(&helper);
        true
    }

    /// Helped nodes in ascending id order
    pub fn helped_nodes(&self) -> Vec<NodeId> {
        self.entries.keys().copied().collect()
    }

    pub fn entries(&self) -> &BTreeMap<NodeId, Vec<NodeId>> {
        &self.entries
    }

    /// Number of helped nodes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn helper_count(&self) -> usize {
        self.helping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the ledger's own structure
    pub fn verify(&self) -> Result<(), LedgerError> {
        let mut seen: HashMap<NodeId, NodeId> = HashMap::new();
        for (helped, helpers) in &self.entries {
            for helper in helpers {
                if helper == helped {
                    return Err(LedgerError::SelfAssist(*helper));
                }
                if self.entries.contains_key(helper) {
                    return Err(LedgerError::ChainedAssist(*helper));
                }
                if let Some(existing) = seen.insert(*helper, *helped) {
                    return Err(LedgerError::HelperCommitted {
                        helper: *helper,
                        existing,
                        requested: *helped,
                    });
                }
            }
        }
        // Reverse index must mirror the entries exactly
        if let Some(helper) = self.helping.keys().find(|h| seen.get(h) != self.helping.get(h)) {
            return Err(LedgerError::ChainedAssist(*helper));
        }
        if seen.len() != self.helping.len()
            && let Some(helper) = seen.keys().find(|h| !self.helping.contains_key(h))
        {
            return Err(LedgerError::ChainedAssist(*helper));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_record_and_order() {
        let mut ledger = FavorLedger::new();
        assert!(ledger.record(NodeId(1), NodeId(0)).unwrap());
        assert!(ledger.record(NodeId(1), NodeId(2)).unwrap());
        assert!(!ledger.record(NodeId(1), NodeId(0)).unwrap());

        assert_eq!(ledger.helpers_of(NodeId(1)), &[NodeId(0), NodeId(2)]);
        assert_eq!(ledger.helping(NodeId(2)), Some(NodeId(1)));
        assert_eq!(ledger.helper_count(), 2);
        ledger.verify().unwrap();
    }

    #[test]
    fn test_helper_under_one_key_only() {
        let mut ledger = FavorLedger::new();
        ledger.record(NodeId(1), NodeId(0)).unwrap();

        let err = ledger.record(NodeId(2), NodeId(0)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::HelperCommitted {
                helper: NodeId(0),
                existing: NodeId(1),
                requested: NodeId(2),
            }
        );
    }

    #[test]
    fn test_rejects_self_and_chained_assist() {
        let mut ledger = FavorLedger::new();
        assert_eq!(ledger.record(NodeId(1), NodeId(1)), Err(LedgerError::SelfAssist(NodeId(1))));

        ledger.record(NodeId(1), NodeId(0)).unwrap();
        // 1 is being helped, so it cannot help
        assert_eq!(ledger.record(NodeId(3), NodeId(1)), Err(LedgerError::ChainedAssist(NodeId(1))));
        // 0 is helping, so it cannot be helped
        assert_eq!(ledger.record(NodeId(0), NodeId(4)), Err(LedgerError::ChainedAssist(NodeId(0))));
    }

    #[test]
    fn test_release_drops_empty_entry() {
        let mut ledger = FavorLedger::new();
        ledger.record(NodeId(1), NodeId(0)).unwrap();
        ledger.record(NodeId(1), NodeId(2)).unwrap();

        assert!(ledger.release(NodeId(1), NodeId(0)));
        assert_eq!(ledger.helpers_of(NodeId(1)), &[NodeId(2)]);
        assert!(!ledger.release(NodeId(1), NodeId(0)));

        assert!(ledger.release(NodeId(1), NodeId(2)));
        assert!(ledger.is_empty());
        assert!(ledger.helping(NodeId(2)).is_none());
    }

    proptest! {
        #[test]
        fn prop_ledger_stays_consistent(ops in proptest::collection::vec((0u32..6, 0u32..6, any::<bool>()), 0..64)) {
            let mut ledger = FavorLedger::new();
            for (a, b, add) in ops {
                if add {
                    let _ = ledger.record(NodeId(a), NodeId(b));
                } else {
                    ledger.release(NodeId(a), NodeId(b));
                }
                prop_assert!(ledger.verify().is_ok());
            }
        }
    }
}

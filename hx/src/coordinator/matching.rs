//! Helper selection
//!
//! Pure function of the distress kind, the distressed node's temperature and
//! the eligible candidates. Filtering for eligibility (sensor-only, committed
//! helpers, out-of-band nodes) happens in the dispatcher before this is called.

use std::cmp::Ordering;

use crate::domain::{AlertKind, NodeId};

/// A node that may be asked to help, with its latest reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: NodeId,
    pub temp_c: f64,
}

impl Candidate {
    pub fn new(id: impl Into<NodeId>, temp_c: f64) -> Self {
        Self { id: id.into(), temp_c }
    }
}

/// Pick the helper for a Hot or Cold alert from `source` at `source_temp_c`
///
/// Hot takes the coldest node strictly below the source, Cold the warmest
/// strictly above. Equal temperatures go to the lowest id. Stabilized alerts
/// never select anyone.
pub fn select_helper(kind: AlertKind, source: NodeId, source_temp_c: f64, candidates: &[Candidate]) -> Option<NodeId> {
    let relieves = |c: &&Candidate| match kind {
        AlertKind::Hot => c.temp_c < source_temp_c,
        AlertKind::Cold => c.temp_c > source_temp_c,
        AlertKind::Stabilized => false,
    };

    candidates
        .iter()
        .filter(|c| c.id != source && c.temp_c.is_finite())
        .filter(relieves)
        .min_by(|a, b| {
            let by_temp = match kind {
                AlertKind::Cold => b.temp_c.total_cmp(&a.temp_c),
                _ => a.temp_c.total_cmp(&b.temp_c),
            };
            match by_temp {
                Ordering::Equal => a.id.cmp(&b.id),
                other => other,
            }
        })
        .map(|c| c.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hot_picks_coldest() {
        let candidates = [Candidate::new(0, 21.0), Candidate::new(2, 19.5), Candidate::new(3, 23.0)];
        assert_eq!(select_helper(AlertKind::Hot, NodeId(1), 30.0, &candidates), Some(NodeId(2)));
    }

    #[test]
    fn test_cold_picks_warmest() {
        let candidates = [Candidate::new(0, 21.0), Candidate::new(2, 23.5), Candidate::new(3, 22.0)];
        assert_eq!(select_helper(AlertKind::Cold, NodeId(1), 18.0, &candidates), Some(NodeId(2)));
    }

    #[test]
    fn test_requires_strict_relief() {
        let candidates = [Candidate::new(0, 30.0), Candidate::new(2, 31.0)];
        assert_eq!(select_helper(AlertKind::Hot, NodeId(1), 30.0, &candidates), None);
        assert_eq!(select_helper(AlertKind::Cold, NodeId(1), 31.0, &candidates), None);
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let candidates = [Candidate::new(7, 20.0), Candidate::new(3, 20.0), Candidate::new(5, 20.0)];
        assert_eq!(select_helper(AlertKind::Hot, NodeId(1), 26.0, &candidates), Some(NodeId(3)));
        assert_eq!(select_helper(AlertKind::Cold, NodeId(1), 15.0, &candidates), Some(NodeId(3)));
    }

    #[test]
    fn test_never_selects_source_or_nan() {
        let candidates = [Candidate::new(1, 10.0), Candidate::new(2, f64::NAN)];
        assert_eq!(select_helper(AlertKind::Hot, NodeId(1), 30.0, &candidates), None);
    }

    #[test]
    fn test_stabilized_selects_nothing() {
        let candidates = [Candidate::new(0, 10.0)];
        assert_eq!(select_helper(AlertKind::Stabilized, NodeId(1), 30.0, &candidates), None);
    }

    fn arb_candidates() -> impl Strategy<Value = Vec<Candidate>> {
        proptest::collection::vec((0u32..8, 10i32..35), 0..8).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(id, t)| Candidate::new(id, t as f64))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_hot_selection_is_extreme_and_stable(candidates in arb_candidates(), source in 0u32..8, temp in 10i32..35) {
            let source = NodeId(source);
            let temp = temp as f64;
            let picked = select_helper(AlertKind::Hot, source, temp, &candidates);

            let mut reversed = candidates.clone();
            reversed.reverse();
            prop_assert_eq!(picked, select_helper(AlertKind::Hot, source, temp, &reversed));

            if let Some(id) = picked {
                prop_assert_ne!(id, source);
                let chosen = candidates.iter().filter(|c| c.id == id).map(|c| c.temp_c).fold(f64::INFINITY, f64::min);
                prop_assert!(chosen < temp);
                for c in candidates.iter().filter(|c| c.id != source && c.temp_c < temp) {
                    prop_assert!(c.temp_c > chosen || (c.temp_c == chosen && c.id >= id));
                }
            } else {
                prop_assert!(candidates.iter().all(|c| c.id == source || c.temp_c >= temp));
            }
        }

        #[test]
        fn prop_cold_never_selects_source(candidates in arb_candidates(), source in 0u32..8, temp in 10i32..35) {
            let picked = select_helper(AlertKind::Cold, NodeId(source), temp as f64, &candidates);
            if let Some(id) = picked {
                prop_assert_ne!(id, NodeId(source));
                prop_assert!(candidates.iter().any(|c| c.id == id && c.temp_c > temp as f64));
            }
        }
    }
}

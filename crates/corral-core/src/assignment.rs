//! Deterministic range assignment.
//!
//! Every member of a group computes its own slice of the partition set
//! locally; there is no leader handing out assignments. That only works
//! because [`range_split`] is a pure function of two sorted inputs: given
//! the same consumer ids and the same partition set, every member derives
//! the same non-overlapping, gap-free split. The coordinator is
//! responsible for making sure all members observe the same inputs before
//! acting; this module only guarantees determinism.

use crate::partition::BrokerPartition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A member's partition slice at one point in the group's history.
///
/// Recomputed whole on every rebalance, never mutated in place. The
/// version increments by one per rebalance and is what the fetch router
/// compares to detect results computed against a superseded split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Rebalance generation, starting at 0 for the empty pre-join assignment
    pub version: u64,
    /// Owned partitions in `(broker_id, partition_index)` order
    pub partitions: Vec<BrokerPartition>,
}

impl Assignment {
    /// The empty assignment a member holds before its first rebalance.
    pub fn empty() -> Self {
        Self {
            version: 0,
            partitions: Vec::new(),
        }
    }

    /// Successor assignment with the given partitions and `version + 1`.
    pub fn advance(&self, mut partitions: Vec<BrokerPartition>) -> Self {
        partitions.sort();
        Self {
            version: self.version + 1,
            partitions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether this assignment contains the given partition.
    pub fn owns(&self, partition: &BrokerPartition) -> bool {
        self.partitions.binary_search(partition).is_ok()
    }
}

/// Split `partitions` across `consumer_ids` as contiguous ranges.
///
/// Both inputs are sorted internally, so callers may pass them in any
/// construction order, since only the sorted content matters. With `n`
/// consumers and `p` partitions, the first `p % n` consumers (in lexical
/// id order) receive `p / n + 1` partitions and the rest `p / n`, taken
/// as contiguous runs of the sorted partition list.
///
/// Edge cases: no consumers yields an empty map; no partitions yields an
/// empty slice for every consumer; more consumers than partitions leaves
/// the trailing consumers empty.
pub fn range_split(
    consumer_ids: &[String],
    partitions: &[BrokerPartition],
) -> BTreeMap<String, Vec<BrokerPartition>> {
    let mut ids: Vec<&String> = consumer_ids.iter().collect();
    ids.sort();
    ids.dedup();

    let mut sorted: Vec<BrokerPartition> = partitions.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut result = BTreeMap::new();
    if ids.is_empty() {
        return result;
    }

    let n = ids.len();
    let p = sorted.len();
    let base = p / n;
    let extra = p % n;

    let mut next = 0;
    for (idx, id) in ids.into_iter().enumerate() {
        let share = base + usize::from(idx < extra);
        let slice = sorted[next..next + share].to_vec();
        next += share;
        result.insert(id.clone(), slice);
    }

    result
}

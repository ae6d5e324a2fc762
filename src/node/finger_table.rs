use std::fmt::Debug;
use std::fmt;

use serde::Serialize;

use crate::node::node_info::NodeInfo;
use crate::utils::crypto::{is_between, HashRingKey};
use crate::utils::types::HashPos;

/// An entry in the finger table: the slot's start position and the node
/// last observed responsible for it.
#[derive(Clone, Serialize)]
pub struct FingerEntry {
    start: HashPos,
    node: NodeInfo,
}

impl FingerEntry {
    pub fn new(start: HashPos, node: NodeInfo) -> Self {
        FingerEntry { start, node }
    }

    pub fn start(&self) -> HashPos {
        self.start
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub fn set_node(&mut self, node: NodeInfo) {
        self.node = node;
    }
}

impl Debug for FingerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("start", &self.start)
            .field("node", &self.node)
            .finish()
    }
}

/// Routing shortcuts at exponentially increasing distances. `fingers[k]`
/// points to the node responsible for `own + 2^k`; slot 0 is the immediate
/// successor.
#[derive(Debug, Clone, Serialize)]
pub struct FingerTable {
    pub fingers: Vec<FingerEntry>,
}

impl FingerTable {
    /// Every slot starts out pointing at the owning node itself.
    pub fn new(own: &NodeInfo) -> FingerTable {
        let mut fingers = Vec::with_capacity(HashPos::finger_count());
        for k in 0..HashPos::finger_count() {
            fingers.push(FingerEntry::new(own.pos().finger_start(k), own.clone()));
        }
        FingerTable { fingers }
    }

    pub fn len(&self) -> usize {
        self.fingers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingers.is_empty()
    }

    /// The immediate successor, i.e. slot 0.
    pub fn first(&self) -> &NodeInfo {
        self.fingers[0].node()
    }

    pub fn node_at(&self, index: usize) -> &NodeInfo {
        self.fingers[index].node()
    }

    pub fn set_finger(&mut self, index: usize, node: NodeInfo) {
        self.fingers[index].set_node(node);
    }

    pub fn set_all_fingers(&mut self, node: &NodeInfo) {
        for finger in &mut self.fingers {
            finger.set_node(node.clone());
        }
    }

    /// Fingers strictly between this node and `key`, farthest slot first,
    /// with consecutive duplicates collapsed. The caller probes them in
    /// order and takes the first live one.
    pub fn preceding_candidates(&self, own_pos: HashPos, key: HashPos) -> Vec<NodeInfo> {
        let mut candidates: Vec<NodeInfo> = self
            .fingers
            .iter()
            .rev()
            .filter(|finger| is_between(finger.node().pos(), own_pos, key, false, false))
            .map(|finger| finger.node().clone())
            .collect();
        candidates.dedup();
        candidates
    }

    /// All distinct finger targets, farthest slot first. Used to hunt for a
    /// live successor replacement once the successor list is exhausted.
    pub fn descending_nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self.fingers.iter().rev().map(|finger| finger.node().clone()).collect();
        nodes.dedup();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pos: HashPos) -> NodeInfo {
        NodeInfo::with_pos("127.0.0.1", 5601, pos)
    }

    #[test]
    fn new_table_points_every_slot_at_the_owner() {
        let own = info(42);
        let table = FingerTable::new(&own);
        assert_eq!(table.len(), HashPos::finger_count());
        for (k, finger) in table.fingers.iter().enumerate() {
            assert_eq!(finger.start(), 42_u64.finger_start(k));
            assert_eq!(finger.node(), &own);
        }
    }

    #[test]
    fn preceding_candidates_scan_farthest_first() {
        let own = info(10);
        let mut table = FingerTable::new(&own);
        table.set_finger(10, info(100));
        table.set_finger(20, info(200));

        // both 100 and 200 precede key 5 going clockwise from 10
        let candidates = table.preceding_candidates(10, 5);
        assert_eq!(candidates, vec![info(200), info(100)]);

        // only 100 precedes key 150
        let candidates = table.preceding_candidates(10, 150);
        assert_eq!(candidates, vec![info(100)]);

        // nothing precedes a key right behind the node
        assert!(table.preceding_candidates(10, 11).is_empty());
    }

    #[test]
    fn candidate_duplicates_are_collapsed() {
        let own = info(10);
        let mut table = FingerTable::new(&own);
        for k in 0..8 {
            table.set_finger(k, info(100));
        }
        assert_eq!(table.preceding_candidates(10, 5), vec![info(100)]);
    }

    #[test]
    fn set_all_fingers_overwrites_every_slot() {
        let own = info(10);
        let other = info(99);
        let mut table = FingerTable::new(&own);
        table.set_all_fingers(&other);
        assert!(table.fingers.iter().all(|finger| finger.node() == &other));
    }
}

use crate::node::finger_table::FingerTable;
use crate::node::node_info::NodeInfo;
use crate::node::successor_list::SuccessorList;
use crate::utils::crypto::{is_between, HashRingKey};
use crate::utils::types::HashPos;

/// The node's complete routing record: finger table, successor list,
/// predecessor pointer and the maintenance bookkeeping. All of it lives
/// behind one mutex so every mutation is serialized; callers snapshot what
/// they need and release the lock before talking to the network.
#[derive(Debug, Clone)]
pub struct RoutingState {
    finger_table: FingerTable,
    successor_list: SuccessorList,
    predecessor: Option<NodeInfo>,
    next_finger: usize,
    active: bool,
    in_ring: bool,
}

impl RoutingState {
    /// State of a node forming a ring of one: every pointer refers back to
    /// the node itself, except the predecessor, which stays unset until the
    /// first self-notify lands.
    pub fn singleton(own: &NodeInfo, slist_size: usize) -> RoutingState {
        RoutingState {
            finger_table: FingerTable::new(own),
            successor_list: SuccessorList::filled_with(own, slist_size),
            predecessor: None,
            next_finger: 0,
            active: true,
            in_ring: false,
        }
    }

    /// State of a node that bootstrapped through a peer.
    pub fn joined(finger_table: FingerTable, successor_list: SuccessorList) -> RoutingState {
        RoutingState {
            finger_table,
            successor_list,
            predecessor: None,
            next_finger: 0,
            active: true,
            in_ring: false,
        }
    }

    pub fn successor(&self) -> NodeInfo {
        self.finger_table.first().clone()
    }

    /// Replaces the direct successor, keeping finger slot 0 and successor
    /// list slot 0 in sync.
    pub fn set_successor(&mut self, node: &NodeInfo) {
        self.finger_table.set_finger(0, node.clone());
        self.successor_list.set_first(node.clone());
    }

    pub fn predecessor_option(&self) -> Option<NodeInfo> {
        self.predecessor.clone()
    }

    pub fn set_predecessor(&mut self, predecessor: Option<NodeInfo>) {
        self.predecessor = predecessor;
    }

    pub fn finger_table(&self) -> &FingerTable {
        &self.finger_table
    }

    pub fn set_finger(&mut self, index: usize, node: NodeInfo) {
        if index == 0 {
            self.set_successor(&node);
        } else {
            self.finger_table.set_finger(index, node);
        }
    }

    pub fn successor_list(&self) -> &SuccessorList {
        &self.successor_list
    }

    pub fn successor_nodes(&self) -> Vec<NodeInfo> {
        self.successor_list.successors.clone()
    }

    /// Installs a successor list fetched from the successor. The head is
    /// re-read under the lock so a concurrent successor change between
    /// fetch and install is not clobbered.
    pub fn refresh_successor_list(&mut self, fetched: Vec<NodeInfo>) {
        let successor = self.successor();
        self.successor_list.refresh(successor, fetched);
    }

    pub fn drop_first_successor(&mut self) -> Option<NodeInfo> {
        self.successor_list.drop_first()
    }

    pub fn first_successor(&self) -> Option<NodeInfo> {
        self.successor_list.first().cloned()
    }

    /// Advances the round-robin cursor and returns the slot to refresh.
    pub fn advance_next_finger(&mut self) -> usize {
        self.next_finger = (self.next_finger + 1) % HashPos::finger_count();
        self.next_finger
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn in_ring(&self) -> bool {
        self.in_ring
    }

    /// Takes the node out of the ring, either on graceful leave or when
    /// stabilization ran out of live peers.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.in_ring = false;
    }

    /// Handler for `notify`: adopt the candidate if there is no predecessor
    /// yet, or if it sits between the current predecessor and this node.
    pub fn adopt_predecessor(&mut self, candidate: &NodeInfo, own_pos: HashPos) -> bool {
        let adopt = match &self.predecessor {
            None => true,
            Some(current) => is_between(candidate.pos(), current.pos(), own_pos, false, false),
        };
        if adopt {
            self.predecessor = Some(candidate.clone());
        }
        adopt
    }

    /// Records that some node acknowledged us as its predecessor. Returns
    /// true only on the first call, the moment the node enters the ring.
    pub fn mark_in_ring(&mut self) -> bool {
        let first = !self.in_ring;
        self.in_ring = true;
        first
    }

    /// Handler for `notify_predecessor_leaving`. Notices from nodes that are
    /// not our predecessor anymore are stale and ignored.
    pub fn predecessor_leaving(&mut self, leaving: &NodeInfo, replacement: Option<NodeInfo>) -> bool {
        if self.predecessor.as_ref() == Some(leaving) {
            self.predecessor = replacement;
            true
        } else {
            false
        }
    }

    /// Handler for `notify_successor_leaving`. The departed successor hands
    /// us its successor list so we can close the ring over it.
    pub fn successor_leaving(&mut self, leaving: &NodeInfo, successors: &[NodeInfo]) -> bool {
        if &self.successor() != leaving {
            return false;
        }
        let new_head = self.successor_list.rotate_for_leaving(successors.last().cloned());
        if let Some(node) = new_head {
            self.set_successor(&node);
        }
        true
    }

    /// True iff both neighbors are the node itself. A fresh singleton still
    /// answers false here: its predecessor stays unset until the first
    /// self-notify arrives.
    pub fn is_alone(&self, own_pos: HashPos) -> bool {
        match &self.predecessor {
            Some(predecessor) => predecessor.pos() == own_pos && self.successor().pos() == own_pos,
            None => false,
        }
    }
}

use serde::Serialize;

use crate::node::node_info::NodeInfo;

/// Ordered cache of the next nodes clockwise on the ring. Slot 0 mirrors
/// the first finger; the remaining slots are failover targets for when the
/// direct successor dies.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessorList {
    pub successors: Vec<NodeInfo>,
    capacity: usize,
}

impl SuccessorList {
    /// List of a node that only knows one successor, e.g. right after a
    /// singleton bootstrap: every slot holds that node.
    pub fn filled_with(node: &NodeInfo, capacity: usize) -> Self {
        SuccessorList {
            successors: vec![node.clone(); capacity],
            capacity,
        }
    }

    /// List seeded with the direct successor only; the join sequence or
    /// stabilization extends it.
    pub fn seeded(successor: &NodeInfo, capacity: usize) -> Self {
        SuccessorList {
            successors: vec![successor.clone()],
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn first(&self) -> Option<&NodeInfo> {
        self.successors.first()
    }

    pub fn last(&self) -> Option<&NodeInfo> {
        self.successors.last()
    }

    pub fn set_first(&mut self, node: NodeInfo) {
        if self.successors.is_empty() {
            self.successors.push(node);
        } else {
            self.successors[0] = node;
        }
    }

    pub fn drop_first(&mut self) -> Option<NodeInfo> {
        if self.successors.is_empty() {
            None
        } else {
            Some(self.successors.remove(0))
        }
    }

    pub fn push(&mut self, node: NodeInfo) {
        if self.successors.len() < self.capacity {
            self.successors.push(node);
        }
    }

    /// Departure handling: drop the departed head, keep the list length
    /// stable by appending the departed node's last known successor, and
    /// report the new head.
    pub fn rotate_for_leaving(&mut self, trailing: Option<NodeInfo>) -> Option<NodeInfo> {
        self.drop_first();
        if let Some(node) = trailing {
            self.push(node);
        }
        self.first().cloned()
    }

    /// Periodic reconciliation: the successor's own list, shifted by one,
    /// becomes ours.
    pub fn refresh(&mut self, successor: NodeInfo, fetched: Vec<NodeInfo>) {
        let mut successors = vec![successor];
        successors.extend(fetched);
        successors.truncate(self.capacity);
        self.successors = successors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::HashPos;

    fn info(pos: HashPos) -> NodeInfo {
        NodeInfo::with_pos("127.0.0.1", 5601, pos)
    }

    #[test]
    fn filled_list_repeats_the_node() {
        let list = SuccessorList::filled_with(&info(1), 3);
        assert_eq!(list.successors, vec![info(1), info(1), info(1)]);
        assert_eq!(list.capacity(), 3);
    }

    #[test]
    fn rotation_keeps_the_length_stable() {
        let mut list = SuccessorList::filled_with(&info(0), 3);
        list.successors = vec![info(1), info(2), info(3)];
        let new_head = list.rotate_for_leaving(Some(info(4)));
        assert_eq!(new_head, Some(info(2)));
        assert_eq!(list.successors, vec![info(2), info(3), info(4)]);
    }

    #[test]
    fn rotation_of_a_single_entry_list_can_empty_it() {
        let mut list = SuccessorList::seeded(&info(1), 3);
        assert_eq!(list.rotate_for_leaving(None), None);
        assert!(list.is_empty());
    }

    #[test]
    fn refresh_prepends_the_successor_and_truncates() {
        let mut list = SuccessorList::filled_with(&info(0), 3);
        list.refresh(info(9), vec![info(8), info(7), info(6), info(5)]);
        assert_eq!(list.successors, vec![info(9), info(8), info(7)]);
    }

    #[test]
    fn push_respects_the_capacity() {
        let mut list = SuccessorList::filled_with(&info(0), 2);
        list.push(info(5));
        assert_eq!(list.len(), 2);
        assert_eq!(list.successors, vec![info(0), info(0)]);
    }
}

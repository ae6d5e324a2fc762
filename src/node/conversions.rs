use crate::node::finger_table::FingerEntry;
use crate::node::node_info::NodeInfo;
use crate::node::successor_list::SuccessorList;
use crate::threads::chord::chord_proto::{FingerEntryMsg, HashPosMsg, NodeMsg, SuccessorListMsg};
use crate::utils::types::HashPos;

impl Into<NodeMsg> for NodeInfo {
    fn into(self) -> NodeMsg {
        NodeMsg {
            ip: self.ip().to_string(),
            port: self.port() as u32,
            pos: self.pos().to_be_bytes().to_vec(),
        }
    }
}

impl Into<NodeMsg> for &NodeInfo {
    fn into(self) -> NodeMsg {
        self.clone().into()
    }
}

impl Into<NodeInfo> for NodeMsg {
    fn into(self) -> NodeInfo {
        let pos = HashPos::from_be_bytes(self.pos.try_into().unwrap());
        NodeInfo::with_pos(&self.ip, self.port as u16, pos)
    }
}

impl Into<NodeInfo> for &NodeMsg {
    fn into(self) -> NodeInfo {
        self.clone().into()
    }
}

impl Into<HashPosMsg> for HashPos {
    fn into(self) -> HashPosMsg {
        HashPosMsg {
            key: self.to_be_bytes().to_vec(),
        }
    }
}

impl Into<HashPos> for HashPosMsg {
    fn into(self) -> HashPos {
        HashPos::from_be_bytes(self.key.try_into().unwrap())
    }
}

impl Into<HashPos> for &HashPosMsg {
    fn into(self) -> HashPos {
        self.clone().into()
    }
}

impl Into<FingerEntryMsg> for &FingerEntry {
    fn into(self) -> FingerEntryMsg {
        FingerEntryMsg {
            start: self.start().to_be_bytes().to_vec(),
            node: Some(self.node().into()),
        }
    }
}

impl Into<SuccessorListMsg> for &SuccessorList {
    fn into(self) -> SuccessorListMsg {
        SuccessorListMsg {
            successors: self.successors.iter().map(|successor| successor.into()).collect(),
        }
    }
}

impl Into<Vec<NodeInfo>> for SuccessorListMsg {
    fn into(self) -> Vec<NodeInfo> {
        self.successors.into_iter().map(|msg| msg.into()).collect()
    }
}

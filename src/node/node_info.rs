use std::fmt::Debug;
use std::fmt;

use serde::Serialize;

use crate::utils::crypto::hash;
use crate::utils::types::{Address, HashPos};

/// Identity and dial address of a ring member. Two infos refer to the same
/// node iff they occupy the same ring position.
#[derive(Clone, Serialize)]
pub struct NodeInfo {
    ip: String,
    port: u16,
    pos: HashPos,
}

impl NodeInfo {
    pub fn new(ip: &str, port: u16) -> Self {
        let pos = hash(format!("{}:{}", ip, port).as_bytes());
        NodeInfo {
            ip: ip.to_string(),
            port,
            pos,
        }
    }

    /// Rebuilds an info whose position is already known, e.g. one received
    /// over the wire.
    pub fn with_pos(ip: &str, port: u16, pos: HashPos) -> Self {
        NodeInfo {
            ip: ip.to_string(),
            port,
            pos,
        }
    }

    pub fn from_address(address: &Address) -> Option<NodeInfo> {
        let (ip, port) = address.rsplit_once(':')?;
        Some(NodeInfo::new(ip, port.parse().ok()?))
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pos(&self) -> HashPos {
        self.pos
    }

    pub fn address(&self) -> Address {
        format!("{}:{}", self.ip, self.port)
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
    }
}

impl Eq for NodeInfo {}

impl Debug for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("pos", &self.pos)
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_derived_from_the_address() {
        let info = NodeInfo::new("127.0.0.1", 5601);
        assert_eq!(info.pos(), hash(b"127.0.0.1:5601"));
        assert_eq!(info.address(), "127.0.0.1:5601");
    }

    #[test]
    fn equality_is_by_position_only() {
        let a = NodeInfo::with_pos("10.0.0.1", 80, 7);
        let b = NodeInfo::with_pos("10.0.0.2", 81, 7);
        let c = NodeInfo::with_pos("10.0.0.1", 80, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn from_address_parses_ip_and_port() {
        let info = NodeInfo::from_address(&"192.168.0.7:4000".to_string()).unwrap();
        assert_eq!(info.ip(), "192.168.0.7");
        assert_eq!(info.port(), 4000);
        assert!(NodeInfo::from_address(&"no-port-here".to_string()).is_none());
    }
}

use log::info;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::node::finger_table::FingerTable;
use crate::node::node_info::NodeInfo;
use crate::node::routing::RoutingState;
use crate::node::successor_list::SuccessorList;
use crate::threads::chord::chord_proto::chord_client::ChordClient;
use crate::threads::chord::chord_proto::Empty;
use crate::threads::chord::{connect, connect_with_retry};
use crate::utils::config::Config;
use crate::utils::crypto::{is_between, HashRingKey};
use crate::utils::types::{Address, HashPos};

/// Builds the initial routing state. Distinguishes two scenarios:
/// 1. no peer is given: the node forms a new ring on its own
/// 2. a peer is given: the node joins the peer's ring through it
///
/// An unreachable bootstrap peer is fatal; the operator has to pick a live
/// one.
pub async fn setup(
    peer_option: Option<Address>,
    self_info: &NodeInfo,
    config: &Config,
) -> Result<RoutingState, Status> {
    match peer_option {
        None => {
            info!("Starting up a new ring");
            Ok(RoutingState::singleton(self_info, config.slist_size))
        }
        Some(peer_address) => {
            info!("Joining existing ring via {}", peer_address);
            let mut peer = connect_with_retry(&peer_address).await.map_err(|_| {
                Status::unavailable(format!("bootstrap node {} is unreachable", peer_address))
            })?;
            let successor: NodeInfo = peer
                .find_successor(Request::new(self_info.pos().into()))
                .await?
                .into_inner()
                .into();
            info!("Bootstrap peer resolved our successor to {:?}", successor);
            let finger_table = build_finger_table(&mut peer, self_info, &successor).await?;
            let successor_list =
                build_successor_list(self_info, &successor, config.slist_size).await;
            Ok(RoutingState::joined(finger_table, successor_list))
        }
    }
}

/// Initial finger table, resolved through the bootstrap peer. A slot whose
/// start still falls between this node and the previous finger reuses that
/// finger, saving a lookup.
async fn build_finger_table(
    peer: &mut ChordClient<Channel>,
    self_info: &NodeInfo,
    successor: &NodeInfo,
) -> Result<FingerTable, Status> {
    let mut finger_table = FingerTable::new(self_info);
    finger_table.set_finger(0, successor.clone());
    for k in 0..HashPos::finger_count() - 1 {
        let start = self_info.pos().finger_start(k + 1);
        let previous = finger_table.node_at(k).clone();
        if is_between(start, self_info.pos(), previous.pos(), true, false) {
            finger_table.set_finger(k + 1, previous);
        } else {
            let node: NodeInfo = peer
                .find_successor(Request::new(start.into()))
                .await?
                .into_inner()
                .into();
            finger_table.set_finger(k + 1, node);
        }
    }
    Ok(finger_table)
}

/// Initial successor list: seeded with the direct successor, then extended
/// by chasing each tail's successor. A failed hop abandons the chase and
/// leaves the rest to stabilization.
async fn build_successor_list(
    self_info: &NodeInfo,
    successor: &NodeInfo,
    capacity: usize,
) -> SuccessorList {
    let mut list = SuccessorList::seeded(successor, capacity);
    while list.len() < capacity {
        let tail = match list.last() {
            Some(tail) if tail != self_info => tail.clone(),
            _ => break,
        };
        let mut client = match connect(&tail.address()).await {
            Ok(client) => client,
            Err(_) => break,
        };
        match client.get_successor(Request::new(Empty {})).await {
            Ok(response) => list.push(response.into_inner().into()),
            Err(_) => break,
        }
    }
    list
}

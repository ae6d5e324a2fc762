use std::sync::{Arc, Mutex};

use log::{debug, info};
use tonic::Request;

use crate::node::node_info::NodeInfo;
use crate::node::routing::RoutingState;
use crate::threads::chord::chord_proto::{PredecessorLeavingMsg, SuccessorLeavingMsg};
use crate::threads::chord::connect;

/// Graceful departure. Stops the maintenance loop by flipping the node
/// inactive, then hands both neighbors the pointers they need to close the
/// ring over us. The notices are best effort; a neighbor that cannot be
/// reached will repair itself through stabilization instead.
pub async fn leave(self_info: &NodeInfo, state: &Arc<Mutex<RoutingState>>) {
    let (successor, predecessor, successors) = {
        let mut guard = state.lock().unwrap();
        guard.deactivate();
        (
            guard.successor(),
            guard.predecessor_option(),
            guard.successor_nodes(),
        )
    };

    if successor == *self_info {
        info!("Leaving a ring of one, nobody to notify");
        return;
    }
    if Some(&successor) == predecessor.as_ref() {
        info!("Leaving without notices, successor and predecessor coincide");
        return;
    }

    match connect(&successor.address()).await {
        Ok(mut client) => {
            let _ = client
                .notify_predecessor_leaving(Request::new(PredecessorLeavingMsg {
                    leaving: Some(self_info.into()),
                    new_predecessor_optional: predecessor
                        .as_ref()
                        .map(|predecessor| predecessor.into()),
                }))
                .await;
        }
        Err(_) => debug!("Successor unreachable during leave"),
    }

    if let Some(predecessor) = predecessor {
        match connect(&predecessor.address()).await {
            Ok(mut client) => {
                let _ = client
                    .notify_successor_leaving(Request::new(SuccessorLeavingMsg {
                        leaving: Some(self_info.into()),
                        successors: successors
                            .iter()
                            .map(|successor| successor.into())
                            .collect(),
                    }))
                    .await;
            }
            Err(_) => debug!("Predecessor unreachable during leave"),
        }
    }

    info!("Left the ring");
}

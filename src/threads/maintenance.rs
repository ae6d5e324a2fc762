use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tonic::Request;

use crate::node::node_info::NodeInfo;
use crate::node::routing::RoutingState;
use crate::threads::chord::chord_proto::Empty;
use crate::threads::chord::{
    apply_notify, check_alive, connect, find_successor_from, signal_joined, JoinedSignal,
};
use crate::utils::config::Config;
use crate::utils::crypto::{is_between, HashRingKey};

/// Periodic repair of the routing state. Every tick runs, in this order:
/// stabilize, fix_fingers, fix_successor_list, fix_predecessor. Fixing
/// fingers against a stale successor wastes work, so stabilize goes first.
/// The loop stops cooperatively once the node is no longer active.
pub async fn run(
    self_info: NodeInfo,
    state: Arc<Mutex<RoutingState>>,
    joined_signal: JoinedSignal,
    config: Config,
) {
    let tick_interval = Duration::from_millis(config.stabilize_interval_millis);
    let probe_timeout = Duration::from_millis(config.liveness_timeout_millis);
    loop {
        tokio::time::sleep(tick_interval).await;
        let active = { state.lock().unwrap().active() };
        if !active {
            break;
        }
        tick(&self_info, &state, &joined_signal, probe_timeout).await;
    }
    info!("Maintenance loop stopped");
}

/// A single maintenance round. Exposed on its own so tests can drive the
/// protocol deterministically.
pub async fn tick(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    joined_signal: &JoinedSignal,
    probe_timeout: Duration,
) {
    stabilize(self_info, state, joined_signal, probe_timeout).await;
    let active = { state.lock().unwrap().active() };
    if !active {
        // stabilize ran out of peers, nothing left to fix
        return;
    }
    fix_fingers(self_info, state, probe_timeout).await;
    fix_successor_list(self_info, state).await;
    fix_predecessor(self_info, state, probe_timeout).await;
}

/// Verifies the successor is alive (replacing it from the successor list,
/// then the finger table, when it is not), adopts a closer successor
/// learned from the successor's own predecessor pointer, and notifies the
/// successor of our presence.
pub async fn stabilize(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    joined_signal: &JoinedSignal,
    probe_timeout: Duration,
) {
    // phase A: make sure the successor pointer refers to a live node
    loop {
        let successor = { state.lock().unwrap().successor() };
        if successor == *self_info || check_alive(&successor.address(), probe_timeout).await {
            break;
        }
        warn!("Successor {:?} is dead, looking for a replacement", successor);
        let next = {
            let mut guard = state.lock().unwrap();
            guard.drop_first_successor();
            guard.first_successor()
        };
        match next {
            Some(next) => {
                state.lock().unwrap().set_successor(&next);
                // loop around to probe the replacement as well
            }
            None => {
                // successor list exhausted, fall back to the finger table
                let candidates = { state.lock().unwrap().finger_table().descending_nodes() };
                let mut replacement = None;
                for candidate in candidates {
                    if candidate == *self_info
                        || check_alive(&candidate.address(), probe_timeout).await
                    {
                        replacement = Some(candidate);
                        break;
                    }
                }
                match replacement {
                    Some(replacement) => {
                        state.lock().unwrap().set_successor(&replacement);
                    }
                    None => {
                        warn!("All known peers are dead, node is isolated");
                        state.lock().unwrap().deactivate();
                        return;
                    }
                }
            }
        }
    }

    // phase B: the successor's predecessor may be a closer successor for us
    let successor = { state.lock().unwrap().successor() };
    let candidate_option: Option<NodeInfo> = if successor == *self_info {
        state.lock().unwrap().predecessor_option()
    } else {
        let mut client = match connect(&successor.address()).await {
            Ok(client) => client,
            Err(_) => {
                debug!("Successor unreachable during stabilize, retrying next tick");
                return;
            }
        };
        match client.get_predecessor(Request::new(Empty {})).await {
            Ok(response) => response.into_inner().node_optional.map(|msg| msg.into()),
            Err(_) => return,
        }
    };
    if let Some(candidate) = candidate_option {
        if is_between(candidate.pos(), self_info.pos(), successor.pos(), false, false)
            && check_alive(&candidate.address(), probe_timeout).await
        {
            debug!("Learned closer successor {:?} from current successor", candidate);
            state.lock().unwrap().set_successor(&candidate);
        }
    }

    // tell the (possibly new) successor about us
    let successor = { state.lock().unwrap().successor() };
    if successor == *self_info {
        if apply_notify(self_info, state, self_info) {
            info!("First predecessor adopted, node is part of the ring");
            signal_joined(joined_signal);
        }
    } else {
        match connect(&successor.address()).await {
            Ok(mut client) => {
                let _ = client.notify(Request::new(self_info.into())).await;
            }
            Err(_) => debug!("Could not notify successor, retrying next tick"),
        }
    }
}

/// Refreshes one finger per tick, round robin. A full sweep over the table
/// takes one tick per ring bit.
pub async fn fix_fingers(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    probe_timeout: Duration,
) {
    let index = { state.lock().unwrap().advance_next_finger() };
    let start = self_info.pos().finger_start(index);
    match find_successor_from(self_info, state, start, probe_timeout).await {
        Ok(node) => {
            debug!("Fixing finger entry {} to {:?}", index, node);
            state.lock().unwrap().set_finger(index, node);
        }
        Err(e) => warn!("An error occurred during fix_fingers: {}", e),
    }
}

/// Reconciles the successor list with the successor's own: its list,
/// shifted by one, becomes ours. Transport failures leave the list alone.
pub async fn fix_successor_list(self_info: &NodeInfo, state: &Arc<Mutex<RoutingState>>) {
    let successor = { state.lock().unwrap().successor() };
    let fetched = if successor == *self_info {
        state.lock().unwrap().successor_nodes()
    } else {
        let mut client = match connect(&successor.address()).await {
            Ok(client) => client,
            Err(_) => return,
        };
        match client.get_successor_list(Request::new(Empty {})).await {
            Ok(response) => response.into_inner().into(),
            Err(_) => return,
        }
    };
    state.lock().unwrap().refresh_successor_list(fetched);
}

/// Clears a dead predecessor so a future notify can fill the slot again.
pub async fn fix_predecessor(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    probe_timeout: Duration,
) {
    let predecessor = match { state.lock().unwrap().predecessor_option() } {
        Some(predecessor) => predecessor,
        None => return,
    };
    if predecessor == *self_info {
        return;
    }
    if !check_alive(&predecessor.address(), probe_timeout).await {
        info!("Predecessor {:?} is dead, clearing the pointer", predecessor);
        let mut guard = state.lock().unwrap();
        // the pointer may have moved while we were probing
        if guard.predecessor_option().as_ref() == Some(&predecessor) {
            guard.set_predecessor(None);
        }
    }
}

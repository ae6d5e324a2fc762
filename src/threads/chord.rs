use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

use crate::node::node_info::NodeInfo;
use crate::node::routing::RoutingState;
use crate::threads::chord::chord_proto::chord_client::ChordClient;
use crate::threads::chord::chord_proto::{
    ActiveMsg, Empty, FindPredecessorResponse, GetPredecessorResponse, HashPosMsg, NodeMsg,
    NodeSummaryMsg, PredecessorLeavingMsg, SuccessorCandidatesRequest, SuccessorLeavingMsg,
    SuccessorListMsg,
};
use crate::utils::config::Config;
use crate::utils::constants::{
    CONNECTION_RETRY_UPON_FAILURE_MILLIS, DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE,
    MAX_CONNECTION_RETRIES,
};
use crate::utils::crypto::{is_between, HashRingKey};
use crate::utils::types::{Address, HashPos};

pub mod chord_proto {
    tonic::include_proto!("chord");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("chord_descriptor");
}

/// One-shot channel fired the first time another node acknowledges this one
/// as its predecessor. Higher layers use it to kick off whatever they do on
/// ring entry.
pub type JoinedSignal = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// The struct representing the running node.
pub struct ChordService {
    /// identity and dial address of this node
    self_info: NodeInfo,
    /// routing record shared with the maintenance loop
    state: Arc<Mutex<RoutingState>>,
    /// fired once, on ring entry
    joined_signal: JoinedSignal,
    /// budget for a single liveness probe
    probe_timeout: Duration,
    /// flag that enables debugging RPCs
    dev_mode: bool,
}

/// connection helper functions

pub async fn connect(address: &Address) -> Result<ChordClient<Channel>, tonic::transport::Error> {
    ChordClient::connect(format!("http://{}", address)).await
}

pub async fn connect_with_retry(address: &Address) -> Result<ChordClient<Channel>, Status> {
    let mut retries = 0;
    loop {
        match connect(address).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                retries += 1;
                if retries > MAX_CONNECTION_RETRIES {
                    return Err(Status::unavailable(format!("{} is unreachable", address)));
                }
                warn!("Failed to connect to {}: {}. Retrying...", address, e);
                sleep(Duration::from_millis(CONNECTION_RETRY_UPON_FAILURE_MILLIS)).await;
            }
        }
    }
}

/// Best-effort liveness probe: a node that cannot answer `health` within the
/// timeout counts as dead. A false negative under transient load only costs
/// the caller a detour.
pub async fn check_alive(address: &Address, probe_timeout: Duration) -> bool {
    let probe = async {
        let mut client = connect(address).await.ok()?;
        client.health(Request::new(Empty {})).await.ok()?;
        Some(())
    };
    matches!(timeout(probe_timeout, probe).await, Ok(Some(())))
}

/// Applies a `notify` to local state, bypassing the transport. Returns true
/// when the adoption was the node's first, i.e. the node just entered the
/// ring.
pub fn apply_notify(self_info: &NodeInfo, state: &Arc<Mutex<RoutingState>>, candidate: &NodeInfo) -> bool {
    let mut guard = state.lock().unwrap();
    if guard.adopt_predecessor(candidate, self_info.pos()) {
        debug!("Adopted {:?} as predecessor", candidate);
        guard.mark_in_ring()
    } else {
        false
    }
}

pub fn signal_joined(signal: &JoinedSignal) {
    if let Some(tx) = signal.lock().unwrap().take() {
        let _ = tx.send(());
    }
}

/// lookup engine, shared by the RPC handlers and the maintenance loop

/// Resolves the node responsible for `key`, starting from this node's
/// routing tables. Hops to the closest preceding live finger and delegates;
/// an unreachable hop propagates to the caller.
pub async fn find_successor_from(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    key: HashPos,
    probe_timeout: Duration,
) -> Result<NodeInfo, Status> {
    let successor = { state.lock().unwrap().successor() };
    if is_between(key, self_info.pos(), successor.pos(), false, true) {
        return Ok(successor);
    }
    let hop = closest_preceding_finger_from(self_info, state, key, probe_timeout).await;
    if hop == *self_info {
        // no finger gets us closer, the successor is the best answer we have
        return Ok(successor);
    }
    let mut client = connect_with_retry(&hop.address()).await?;
    let response = client.find_successor(Request::new(key.into())).await?;
    Ok(response.into_inner().into())
}

/// Scans the finger table from the farthest slot down and returns the first
/// live finger strictly between this node and `key`; falls back to the node
/// itself.
pub async fn closest_preceding_finger_from(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    key: HashPos,
    probe_timeout: Duration,
) -> NodeInfo {
    let candidates = {
        state
            .lock()
            .unwrap()
            .finger_table()
            .preceding_candidates(self_info.pos(), key)
    };
    for candidate in candidates {
        if check_alive(&candidate.address(), probe_timeout).await {
            return candidate;
        }
        debug!("Skipping dead finger {:?}", candidate);
    }
    self_info.clone()
}

/// Walks the ring toward `key` until it finds the node whose successor
/// interval covers it. The walk is capped at one hop per finger slot; a
/// ring that fails to advance it surfaces as unreachable.
pub async fn find_predecessor_from(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    key: HashPos,
    probe_timeout: Duration,
) -> Result<Option<NodeInfo>, Status> {
    if key == self_info.pos() {
        return Ok({ state.lock().unwrap().predecessor_option() });
    }
    let mut current = self_info.clone();
    let mut current_successor = { state.lock().unwrap().successor() };
    let mut hops = 0;
    while !is_between(key, current.pos(), current_successor.pos(), false, true) {
        if hops >= HashPos::finger_count() {
            return Err(Status::unavailable("find_predecessor exhausted its hop budget"));
        }
        hops += 1;
        let next = if current == *self_info {
            closest_preceding_finger_from(self_info, state, key, probe_timeout).await
        } else {
            let mut client = connect_with_retry(&current.address()).await?;
            let response = client.closest_preceding_finger(Request::new(key.into())).await?;
            response.into_inner().into()
        };
        current_successor = if next == *self_info {
            state.lock().unwrap().successor()
        } else {
            let mut client = connect_with_retry(&next.address()).await?;
            let response = client.get_successor(Request::new(Empty {})).await?;
            response.into_inner().into()
        };
        current = next;
    }
    Ok(Some(current))
}

/// Collects up to `max` nodes responsible for `key`, primary owner first:
/// the key's successor, that node's successor list, then further successors
/// chased clockwise. Falls back through the key's predecessor when the
/// owner cannot be reached.
pub async fn successor_candidates_from(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    key: HashPos,
    max: usize,
    probe_timeout: Duration,
) -> Result<Vec<NodeInfo>, Status> {
    if max == 0 {
        return Ok(Vec::new());
    }
    let mut candidates = match find_successor_from(self_info, state, key, probe_timeout).await {
        Ok(owner) => match fetch_successor_list(self_info, state, &owner).await {
            Ok(mut list) => {
                let mut all = vec![owner];
                all.append(&mut list);
                Some(all)
            }
            Err(_) => None,
        },
        Err(_) => None,
    };
    if candidates.is_none() {
        if let Ok(Some(predecessor)) = find_predecessor_from(self_info, state, key, probe_timeout).await {
            if let Ok(list) = fetch_successor_list(self_info, state, &predecessor).await {
                candidates = Some(list);
            }
        }
    }
    let mut list =
        candidates.ok_or_else(|| Status::unavailable("no live route to the key's successor"))?;
    while list.len() < max {
        let tail = match list.last() {
            Some(tail) => tail.clone(),
            None => break,
        };
        let next = if tail == *self_info {
            state.lock().unwrap().successor()
        } else {
            let mut client = match connect(&tail.address()).await {
                Ok(client) => client,
                Err(_) => break,
            };
            match client.get_successor(Request::new(Empty {})).await {
                Ok(response) => response.into_inner().into(),
                Err(_) => break,
            }
        };
        list.push(next);
    }
    list.truncate(max);
    Ok(list)
}

async fn fetch_successor_list(
    self_info: &NodeInfo,
    state: &Arc<Mutex<RoutingState>>,
    node: &NodeInfo,
) -> Result<Vec<NodeInfo>, Status> {
    if node == self_info {
        return Ok({ state.lock().unwrap().successor_nodes() });
    }
    let mut client = connect_with_retry(&node.address()).await?;
    let response = client.get_successor_list(Request::new(Empty {})).await?;
    Ok(response.into_inner().into())
}

impl ChordService {
    pub fn new(
        self_info: NodeInfo,
        state: Arc<Mutex<RoutingState>>,
        joined_signal: JoinedSignal,
        config: &Config,
    ) -> ChordService {
        ChordService {
            probe_timeout: Duration::from_millis(config.liveness_timeout_millis),
            dev_mode: config.dev_mode,
            self_info,
            state,
            joined_signal,
        }
    }
}

#[tonic::async_trait]
impl chord_proto::chord_server::Chord for ChordService {
    async fn get_id(&self, _: Request<Empty>) -> Result<Response<HashPosMsg>, Status> {
        Ok(Response::new(self.self_info.pos().into()))
    }

    async fn get_active(&self, _: Request<Empty>) -> Result<Response<ActiveMsg>, Status> {
        let active = { self.state.lock().unwrap().active() };
        Ok(Response::new(ActiveMsg { active }))
    }

    async fn get_info(&self, _: Request<Empty>) -> Result<Response<NodeMsg>, Status> {
        Ok(Response::new((&self.self_info).into()))
    }

    async fn get_successor(&self, _: Request<Empty>) -> Result<Response<NodeMsg>, Status> {
        let successor = { self.state.lock().unwrap().successor() };
        Ok(Response::new(successor.into()))
    }

    /// returns the current node's value of the predecessor handle
    async fn get_predecessor(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<GetPredecessorResponse>, Status> {
        let predecessor = { self.state.lock().unwrap().predecessor_option() };
        Ok(Response::new(GetPredecessorResponse {
            node_optional: predecessor.map(|predecessor| predecessor.into()),
        }))
    }

    /// returns the current node's successor list
    async fn get_successor_list(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<SuccessorListMsg>, Status> {
        let msg = {
            let guard = self.state.lock().unwrap();
            guard.successor_list().into()
        };
        Ok(Response::new(msg))
    }

    /// finds the node responsible for a given position on the hash ring
    async fn find_successor(&self, request: Request<HashPosMsg>) -> Result<Response<NodeMsg>, Status> {
        let key: HashPos = request.into_inner().into();
        let successor =
            find_successor_from(&self.self_info, &self.state, key, self.probe_timeout).await?;
        debug!("Received find_successor call for {}, successor is {:?}", key, successor);
        Ok(Response::new(successor.into()))
    }

    async fn find_predecessor(
        &self,
        request: Request<HashPosMsg>,
    ) -> Result<Response<FindPredecessorResponse>, Status> {
        let key: HashPos = request.into_inner().into();
        let predecessor =
            find_predecessor_from(&self.self_info, &self.state, key, self.probe_timeout).await?;
        Ok(Response::new(FindPredecessorResponse {
            node_optional: predecessor.map(|predecessor| predecessor.into()),
        }))
    }

    /// finds the finger that closest precedes the given hash position
    async fn closest_preceding_finger(
        &self,
        request: Request<HashPosMsg>,
    ) -> Result<Response<NodeMsg>, Status> {
        let key: HashPos = request.into_inner().into();
        let finger =
            closest_preceding_finger_from(&self.self_info, &self.state, key, self.probe_timeout)
                .await;
        Ok(Response::new(finger.into()))
    }

    /// returns the nodes responsible for a key, primary owner first
    async fn successor_candidates(
        &self,
        request: Request<SuccessorCandidatesRequest>,
    ) -> Result<Response<SuccessorListMsg>, Status> {
        let request = request.into_inner();
        let key = HashPos::from_be_bytes(
            request
                .key
                .try_into()
                .map_err(|_| Status::invalid_argument("malformed ring position"))?,
        );
        let candidates = successor_candidates_from(
            &self.self_info,
            &self.state,
            key,
            request.max as usize,
            self.probe_timeout,
        )
        .await?;
        Ok(Response::new(SuccessorListMsg {
            successors: candidates.into_iter().map(|candidate| candidate.into()).collect(),
        }))
    }

    /// Notify call placed on a node by its presumed predecessor. The first
    /// accepted notify is the moment this node becomes part of the ring.
    async fn notify(&self, request: Request<NodeMsg>) -> Result<Response<Empty>, Status> {
        let candidate: NodeInfo = request.into_inner().into();
        if apply_notify(&self.self_info, &self.state, &candidate) {
            info!("First predecessor adopted, node is part of the ring");
            signal_joined(&self.joined_signal);
        }
        Ok(Response::new(Empty {}))
    }

    /// a departing predecessor hands us its own predecessor
    async fn notify_predecessor_leaving(
        &self,
        request: Request<PredecessorLeavingMsg>,
    ) -> Result<Response<Empty>, Status> {
        let msg = request.into_inner();
        let leaving: NodeInfo = msg
            .leaving
            .ok_or_else(|| Status::invalid_argument("leaving node is missing"))?
            .into();
        let replacement = msg.new_predecessor_optional.map(|msg| msg.into());
        let applied = {
            self.state
                .lock()
                .unwrap()
                .predecessor_leaving(&leaving, replacement)
        };
        if applied {
            info!("Predecessor {:?} left gracefully", leaving);
        } else {
            debug!("Ignoring stale predecessor-leaving notice from {:?}", leaving);
        }
        Ok(Response::new(Empty {}))
    }

    /// a departing successor hands us its successor list
    async fn notify_successor_leaving(
        &self,
        request: Request<SuccessorLeavingMsg>,
    ) -> Result<Response<Empty>, Status> {
        let msg = request.into_inner();
        let leaving: NodeInfo = msg
            .leaving
            .ok_or_else(|| Status::invalid_argument("leaving node is missing"))?
            .into();
        let successors: Vec<NodeInfo> = msg.successors.into_iter().map(|msg| msg.into()).collect();
        let applied = {
            self.state
                .lock()
                .unwrap()
                .successor_leaving(&leaving, &successors)
        };
        if applied {
            info!("Successor {:?} left gracefully", leaving);
        } else {
            debug!("Ignoring stale successor-leaving notice from {:?}", leaving);
        }
        Ok(Response::new(Empty {}))
    }

    /// dummy call, used to check if the receiver node is still available
    async fn health(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    /// returns a full routing snapshot (requires dev_mode = true)
    async fn get_node_summary(&self, _: Request<Empty>) -> Result<Response<NodeSummaryMsg>, Status> {
        if !self.dev_mode {
            return Err(Status::unimplemented(DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE));
        }
        let guard = self.state.lock().unwrap();
        Ok(Response::new(NodeSummaryMsg {
            info: Some((&self.self_info).into()),
            predecessor_optional: guard.predecessor_option().map(|predecessor| predecessor.into()),
            finger_entries: guard
                .finger_table()
                .fingers
                .iter()
                .map(|finger| finger.into())
                .collect(),
            successor_list: Some(guard.successor_list().into()),
            active: guard.active(),
            in_ring: guard.in_ring(),
        }))
    }
}

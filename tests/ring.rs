use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::Request;

use chordd::node::node_info::NodeInfo;
use chordd::node::routing::RoutingState;
use chordd::threads::chord::chord_proto::chord_server::ChordServer;
use chordd::threads::chord::chord_proto::PredecessorLeavingMsg;
use chordd::threads::chord::{self, ChordService, JoinedSignal};
use chordd::threads::{join, maintenance, shutdown};
use chordd::utils::config::Config;
use chordd::utils::types::HashPos;

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

struct TestNode {
    info: NodeInfo,
    state: Arc<Mutex<RoutingState>>,
    joined_signal: JoinedSignal,
    joined_rx: Option<oneshot::Receiver<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl TestNode {
    async fn tick(&self) {
        maintenance::tick(&self.info, &self.state, &self.joined_signal, PROBE_TIMEOUT).await;
    }

    fn successor(&self) -> NodeInfo {
        self.state.lock().unwrap().successor()
    }

    fn predecessor(&self) -> Option<NodeInfo> {
        self.state.lock().unwrap().predecessor_option()
    }

    fn is_alone(&self) -> bool {
        self.state.lock().unwrap().is_alone(self.info.pos())
    }

    async fn find_successor(&self, key: HashPos) -> NodeInfo {
        chord::find_successor_from(&self.info, &self.state, key, PROBE_TIMEOUT)
            .await
            .unwrap()
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.slist_size = 3;
    config.liveness_timeout_millis = 300;
    config.dev_mode = true;
    config
}

/// Boots a node on an ephemeral localhost port: builds its routing state
/// (joining through `peer` when given) and serves the RPC surface.
async fn start_node(peer: Option<String>) -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let info = NodeInfo::new("127.0.0.1", port);
    let config = test_config();

    let state = Arc::new(Mutex::new(join::setup(peer, &info, &config).await.unwrap()));

    let (joined_tx, joined_rx) = oneshot::channel();
    let joined_signal: JoinedSignal = Arc::new(Mutex::new(Some(joined_tx)));
    let service = ChordService::new(info.clone(), state.clone(), joined_signal.clone(), &config);
    let server = tokio::spawn(async move {
        Server::builder()
            .add_service(ChordServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    TestNode {
        info,
        state,
        joined_signal,
        joined_rx: Some(joined_rx),
        server,
    }
}

/// The node responsible for `key`: the first position at or after it on the
/// ring, wrapping around to the smallest.
fn expected_owner(key: HashPos, nodes: &[&NodeInfo]) -> NodeInfo {
    let mut sorted: Vec<&NodeInfo> = nodes.to_vec();
    sorted.sort_by_key(|node| node.pos());
    sorted
        .iter()
        .find(|node| node.pos() >= key)
        .copied()
        .unwrap_or(sorted[0])
        .clone()
}

/// Two converged nodes: A formed the ring, B joined through it, and both
/// ran enough maintenance rounds for every pointer to settle.
async fn converged_pair() -> (TestNode, TestNode) {
    let a = start_node(None).await;
    a.tick().await;
    let b = start_node(Some(a.info.address())).await;
    b.tick().await;
    a.tick().await;
    b.tick().await;
    a.tick().await;
    (a, b)
}

#[tokio::test]
async fn singleton_owns_the_whole_ring() {
    let mut a = start_node(None).await;

    assert_eq!(a.successor(), a.info);
    assert_eq!(a.predecessor(), None);
    assert!(!a.is_alone());

    for key in [0, 17, a.info.pos().wrapping_add(1), HashPos::MAX] {
        assert_eq!(a.find_successor(key).await, a.info);
    }

    // the first tick makes the node notify itself
    a.tick().await;
    assert_eq!(a.predecessor(), Some(a.info.clone()));
    assert!(a.is_alone());
    a.joined_rx.take().unwrap().await.unwrap();

    a.server.abort();
}

#[tokio::test]
async fn two_nodes_converge_and_agree_on_every_key() {
    let a = start_node(None).await;
    a.tick().await;

    let mut b = start_node(Some(a.info.address())).await;
    assert_eq!(b.successor(), a.info);

    // one round each closes the ring
    b.tick().await;
    assert_eq!(a.predecessor(), Some(b.info.clone()));
    a.tick().await;
    assert_eq!(a.successor(), b.info);
    assert_eq!(b.predecessor(), Some(a.info.clone()));
    b.joined_rx.take().unwrap().await.unwrap();
    assert!(!a.is_alone());
    assert!(!b.is_alone());

    let keys = [
        0,
        17,
        a.info.pos(),
        a.info.pos().wrapping_add(1),
        b.info.pos(),
        b.info.pos().wrapping_add(1),
        HashPos::MAX,
    ];
    for key in keys {
        let expected = expected_owner(key, &[&a.info, &b.info]);
        assert_eq!(a.find_successor(key).await, expected, "lookup from a for {}", key);
        assert_eq!(b.find_successor(key).await, expected, "lookup from b for {}", key);
    }

    a.server.abort();
    b.server.abort();
}

#[tokio::test]
async fn successor_lists_and_candidates_follow_the_ring() {
    let (a, b) = converged_pair().await;

    // slot 0 of the successor list mirrors the first finger
    {
        let guard = a.state.lock().unwrap();
        assert_eq!(guard.first_successor(), Some(b.info.clone()));
        assert_eq!(guard.finger_table().first(), &b.info);
    }

    let candidates =
        chord::successor_candidates_from(&a.info, &a.state, b.info.pos(), 4, PROBE_TIMEOUT)
            .await
            .unwrap();
    assert_eq!(candidates.len(), 4);
    assert_eq!(candidates[0], b.info);
    // the rest of the list walks the two-node ring
    assert!(candidates[1..].iter().all(|node| node == &a.info || node == &b.info));

    a.server.abort();
    b.server.abort();
}

#[tokio::test]
async fn departed_node_is_forgotten_within_one_tick() {
    let (a, b) = converged_pair().await;

    // with two nodes the neighbors coincide, so leave sends no notices and
    // the survivor repairs through stabilization
    shutdown::leave(&b.info, &b.state).await;
    assert!(!b.state.lock().unwrap().active());
    b.server.abort();

    a.tick().await;
    assert_eq!(a.successor(), a.info);
    assert_eq!(a.find_successor(b.info.pos()).await, a.info);

    // the dead predecessor pointer was cleared for future notifies
    assert_eq!(a.predecessor(), None);

    a.server.abort();
}

#[tokio::test]
async fn stale_leave_notices_are_ignored_over_the_wire() {
    let a = start_node(None).await;
    a.tick().await;
    assert_eq!(a.predecessor(), Some(a.info.clone()));

    let mut client = chord::connect(&a.info.address()).await.unwrap();
    let stranger = NodeInfo::new("127.0.0.1", 1);

    // a node we never heard of claims to be our leaving predecessor
    client
        .notify_predecessor_leaving(Request::new(PredecessorLeavingMsg {
            leaving: Some((&stranger).into()),
            new_predecessor_optional: None,
        }))
        .await
        .unwrap();
    assert_eq!(a.predecessor(), Some(a.info.clone()));

    // the real predecessor leaving hands over its own predecessor
    client
        .notify_predecessor_leaving(Request::new(PredecessorLeavingMsg {
            leaving: Some((&a.info).into()),
            new_predecessor_optional: Some((&stranger).into()),
        }))
        .await
        .unwrap();
    assert_eq!(a.predecessor(), Some(stranger));

    a.server.abort();
}

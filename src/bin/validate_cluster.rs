use std::env;
use std::process::exit;

use tonic::transport::Channel;
use tonic::Request;

use chordd::threads::chord::chord_proto::chord_client::ChordClient;
use chordd::threads::chord::chord_proto::{Empty, NodeMsg, NodeSummaryMsg};
use chordd::utils::types::HashPos;

/// Pulls a routing snapshot from every given node (dev_mode must be on) and
/// checks the ring invariants: predecessor pointers, successor lists and
/// finger targets.
#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() == 1 {
        panic!("Provide at least one node address")
    }

    let mut node_summaries: Vec<NodeSummaryMsg> = Vec::new();
    for host in args.iter().skip(1) {
        let mut client: ChordClient<Channel> = ChordClient::connect(format!("http://{}", host))
            .await
            .unwrap();
        let summary = client
            .get_node_summary(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();
        node_summaries.push(summary);
    }

    node_summaries.sort_by_key(|summary| pos_of(summary.info.as_ref().unwrap()));
    let node_positions: Vec<HashPos> = node_summaries
        .iter()
        .map(|summary| pos_of(summary.info.as_ref().unwrap()))
        .collect();

    let mut is_valid = true;

    // every node must be its clockwise neighbor's predecessor
    for i in 0..node_summaries.len() {
        let current_pos = node_positions[i];
        let next = &node_summaries[(i + 1) % node_summaries.len()];
        match next.predecessor_optional.as_ref() {
            Some(predecessor) if pos_of(predecessor) == current_pos => {}
            other => {
                eprintln!(
                    "Node {}: wrong predecessor, expected {} but found {:?}",
                    pos_of(next.info.as_ref().unwrap()),
                    current_pos,
                    other.map(pos_of),
                );
                is_valid = false;
            }
        }
    }

    // every finger must point at the node responsible for its start
    for summary in &node_summaries {
        for (k, finger) in summary.finger_entries.iter().enumerate() {
            let start = decode_pos(&finger.start);
            let pointed_to = pos_of(finger.node.as_ref().unwrap());
            let responsible = responsible_node_for(start, &node_positions);
            if pointed_to != responsible {
                eprintln!(
                    "Node {}: finger {} with start {} points at {}, but {} is responsible",
                    pos_of(summary.info.as_ref().unwrap()),
                    k,
                    start,
                    pointed_to,
                    responsible,
                );
                is_valid = false;
            }
        }
    }

    // successor lists must walk the ring in order
    for (i, summary) in node_summaries.iter().enumerate() {
        let successor_list = summary.successor_list.as_ref().unwrap();
        for (j, successor) in successor_list.successors.iter().enumerate() {
            let expected = node_positions[(i + j + 1) % node_positions.len()];
            if pos_of(successor) != expected {
                eprintln!(
                    "Node {}: successor list entry {} is {}, expected {}",
                    node_positions[i],
                    j,
                    pos_of(successor),
                    expected,
                );
                is_valid = false;
            }
        }
    }

    if is_valid {
        eprintln!("Looks good!")
    } else {
        eprintln!("Cluster is invalid!");
        exit(1);
    }
}

fn pos_of(node: &NodeMsg) -> HashPos {
    decode_pos(&node.pos)
}

fn decode_pos(bytes: &[u8]) -> HashPos {
    HashPos::from_be_bytes(bytes.to_vec().try_into().unwrap())
}

/// The node responsible for `key`: the first position at or after it, or
/// the smallest one once the ring wraps.
fn responsible_node_for(key: HashPos, positions: &[HashPos]) -> HashPos {
    *positions
        .iter()
        .filter(|&&pos| key <= pos)
        .min()
        .unwrap_or_else(|| positions.iter().min().unwrap())
}

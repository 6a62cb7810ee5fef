//! Connects to a live ring and checks that the successor chain closes and
//! that the overlay snapshot names every node once -- a debug/ops tool, not
//! part of the wire protocol surface.
use std::collections::HashMap;
use std::env;

use chordkv::node::broadcast::NodeDescriptor;
use chordkv::node::peer;

#[tokio::main]
async fn main() {
    let addrs: Vec<String> = env::args().skip(1).collect();
    if addrs.is_empty() {
        eprintln!("usage: validate_cluster <ip:port> [ip:port ...]");
        std::process::exit(1);
    }

    let entry = &addrs[0];
    let overlay = match peer::call(entry, "overlay").await {
        Ok(reply) => reply,
        Err(e) => {
            eprintln!("failed to reach {entry}: {e}");
            std::process::exit(1);
        }
    };

    let nodes: HashMap<String, NodeDescriptor> = match serde_json::from_str(&overlay) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("overlay reply from {entry} was not valid JSON: {e}");
            std::process::exit(1);
        }
    };

    let mut is_valid = true;

    // Overlay returns exactly one entry per node named on the command line.
    if nodes.len() != addrs.len() {
        eprintln!(
            "overlay completeness violated: expected {} entries, got {}",
            addrs.len(),
            nodes.len()
        );
        is_valid = false;
    }

    let ids: std::collections::HashSet<u64> = nodes.values().map(|n| n.id).collect();

    // Every entry's successor field names another listed entry.
    for descriptor in nodes.values() {
        if !ids.contains(&descriptor.successor) {
            eprintln!(
                "node {} ({}:{}) points to unknown successor {}",
                descriptor.id, descriptor.ip, descriptor.port, descriptor.successor
            );
            is_valid = false;
        }
        if !ids.contains(&descriptor.predecessor) {
            eprintln!(
                "node {} ({}:{}) points to unknown predecessor {}",
                descriptor.id, descriptor.ip, descriptor.port, descriptor.predecessor
            );
            is_valid = false;
        }
    }

    // Walking `successor` from any node should visit every node exactly once.
    if let Some(start) = nodes.values().next() {
        let mut visited = std::collections::HashSet::new();
        let mut current = start.id;
        loop {
            if !visited.insert(current) {
                break;
            }
            match nodes.get(&current.to_string()) {
                Some(descriptor) => current = descriptor.successor,
                None => break,
            }
        }
        if visited.len() != nodes.len() {
            eprintln!(
                "ring closure violated: walk from {} visited {} of {} nodes",
                start.id,
                visited.len(),
                nodes.len()
            );
            is_valid = false;
        }
    }

    if is_valid {
        println!("Looks good! {} nodes, ring closes cleanly.", nodes.len());
    } else {
        eprintln!("Cluster is invalid!");
        std::process::exit(1);
    }
}

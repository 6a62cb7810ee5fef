use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::node::peer;
use crate::node::state::Node;
use crate::utils::error::{CoreError, CoreResult};
use crate::utils::types::{Consistency, NodeId};

/// One node's contribution to an `overlay` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub ip: String,
    pub port: u16,
    pub successor: NodeId,
    pub predecessor: NodeId,
    pub is_bootstrap: bool,
    pub key_count: usize,
}

fn describe(node: &Node) -> NodeDescriptor {
    NodeDescriptor {
        id: node.id(),
        ip: node.self_ref.ip.clone(),
        port: node.self_ref.port,
        successor: node.successor().id,
        predecessor: node.predecessor().id,
        is_bootstrap: node.is_bootstrap,
        key_count: node.with_store(|store| store.len()),
    }
}

/// True once this node's successor closes the lap back to where the
/// broadcast started.
fn is_last_lap(node: &Node, initial: NodeId) -> bool {
    node.successor().id == initial
}

/// Single-lap aggregation of every node's pointer state and key count. The
/// initiator seeds `initial_node`; the last node on the lap answers with a
/// singleton map, and every caller merges its own entry in on the way back.
pub async fn overlay(node: &Node, initial_node: Option<NodeId>) -> CoreResult<String> {
    let initial = initial_node.unwrap_or_else(|| node.id());
    let successor = node.successor();

    let mut map: HashMap<String, NodeDescriptor> = if is_last_lap(node, initial) {
        HashMap::new()
    } else {
        let cmd = format!("overlay {initial}");
        let reply = peer::call(&successor.addr(), &cmd).await?;
        match serde_json::from_str(&reply) {
            Ok(downstream) => downstream,
            Err(e) => {
                warn!("overlay aggregation from {} unparsable: {e}", successor.addr());
                HashMap::new()
            }
        }
    };

    map.insert(node.id().to_string(), describe(node));
    serde_json::to_string(&map).map_err(|e| CoreError::Aggregation(e.to_string()))
}

/// Same single-lap traversal as `overlay`; every visited node applies the
/// new `(k, mode)`, clears its local store and contributes an `ACK` keyed by
/// its short id.
pub async fn reset_config(node: &Node, k: u32, mode: Consistency, initial_node: Option<NodeId>) -> CoreResult<String> {
    let initial = initial_node.unwrap_or_else(|| node.id());

    node.set_config(k, mode);
    node.with_store(|store| store.clear());

    let mut acks: HashMap<String, String> = HashMap::new();
    acks.insert(node.short_id(), "ACK".to_string());

    let successor = node.successor();
    if !is_last_lap(node, initial) {
        let cmd = format!("reset_config {k} {mode} {initial}");
        match peer::call(&successor.addr(), &cmd).await {
            Ok(reply) => match serde_json::from_str::<HashMap<String, String>>(&reply) {
                Ok(downstream) => acks.extend(downstream),
                Err(e) => warn!("reset_config aggregation from {} unparsable: {e}", successor.addr()),
            },
            Err(e) => warn!("reset_config forward to {} failed: {e}", successor.addr()),
        }
    }

    serde_json::to_string(&acks).map_err(|e| CoreError::Aggregation(e.to_string()))
}

/// Backing implementation of `query *`: same single-lap shape as `overlay`,
/// merging local stores instead of pointer descriptors.
pub async fn aggregate_query(node: &Node, initial_node: Option<NodeId>) -> CoreResult<String> {
    let initial = initial_node.unwrap_or_else(|| node.id());
    let successor = node.successor();

    let mut map: HashMap<String, String> = if is_last_lap(node, initial) {
        HashMap::new()
    } else {
        let cmd = format!("query * {initial}");
        match peer::call(&successor.addr(), &cmd).await {
            Ok(reply) => serde_json::from_str(&reply).unwrap_or_else(|e| {
                warn!("query * aggregation from {} unparsable: {e}", successor.addr());
                HashMap::new()
            }),
            Err(e) => {
                warn!("query * forward to {} failed: {e}", successor.addr());
                HashMap::new()
            }
        }
    };

    let local = node.with_store(|store| {
        store
            .iter()
            .map(|(k, record)| (k.clone(), record.value.clone()))
            .collect::<HashMap<_, _>>()
    });
    map.extend(local);

    serde_json::to_string(&map).map_err(|e| CoreError::Aggregation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_reports_self_referential_pointers_on_singleton() {
        let node = Node::new("127.0.0.1", 5000, true, 3, Consistency::Chain);
        let d = describe(&node);
        assert_eq!(d.id, d.successor);
        assert_eq!(d.id, d.predecessor);
        assert_eq!(d.key_count, 0);
    }

    #[test]
    fn is_last_lap_true_on_singleton_with_self_initial() {
        let node = Node::new("127.0.0.1", 5000, true, 3, Consistency::Chain);
        assert!(is_last_lap(&node, node.id()));
    }

    #[tokio::test]
    async fn overlay_on_singleton_contains_exactly_one_entry() {
        let node = Node::new("127.0.0.1", 5000, true, 3, Consistency::Chain);
        let json = overlay(&node, None).await.unwrap();
        let map: HashMap<String, NodeDescriptor> = serde_json::from_str(&json).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn reset_config_on_singleton_clears_store_and_acks_once() {
        let node = Node::new("127.0.0.1", 5000, true, 3, Consistency::Chain);
        node.with_store(|s| s.insert("a".to_string(), "1".to_string(), 0));
        let json = reset_config(&node, 5, Consistency::Eventual, None).await.unwrap();
        let acks: HashMap<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(node.with_store(|s| s.len()), 0);
        assert_eq!(node.config().k, 5);
    }

    #[tokio::test]
    async fn aggregate_query_on_singleton_returns_local_store() {
        let node = Node::new("127.0.0.1", 5000, true, 3, Consistency::Chain);
        node.with_store(|s| s.insert("a".to_string(), "1".to_string(), 0));
        let json = aggregate_query(&node, None).await.unwrap();
        let map: HashMap<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(map.get("a").unwrap(), "1");
    }
}

use std::sync::Arc;

use log::warn;

use crate::node::state::{Node, RingConfig};
use crate::node::store::KEY_NOT_FOUND;
use crate::node::{broadcast, peer};
use crate::utils::constants::EVENTUAL_REPLICATION_DELAY;
use crate::utils::crypto::hash;
use crate::utils::error::{CoreError, CoreResult};
use crate::utils::types::Consistency;

/// An insert arrives either during the routing phase (`replica_count == 0`,
/// still looking for the primary) or as a replica link (`replica_count > 0`,
/// applied unconditionally).
pub async fn handle_insert(
    node: Arc<Node>,
    key: String,
    value: String,
    replica_count: Option<u32>,
) -> CoreResult<String> {
    let RingConfig { k, mode } = node.config();
    let replica_count = replica_count.unwrap_or(0);
    let target = hash(&key);

    if replica_count == 0 && !node.responsible_for(target) {
        let successor = node.successor();
        let cmd = format!("insert \"{key}\" {value} 0");
        return peer::call(&successor.addr(), &cmd).await;
    }

    if replica_count >= k {
        return Err(CoreError::ReplicationLimitReached);
    }

    node.with_store(|store| store.insert(key.clone(), value.clone(), replica_count));

    if replica_count + 1 >= k {
        return Ok(format!("Inserted '{key}': '{value}'"));
    }

    let successor = node.successor();
    let next_cmd = format!("insert \"{key}\" {value} {}", replica_count + 1);

    match mode {
        Consistency::Chain => peer::call(&successor.addr(), &next_cmd).await,
        Consistency::Eventual => {
            tokio::spawn(async move {
                tokio::time::sleep(EVENTUAL_REPLICATION_DELAY).await;
                if let Err(e) = peer::call(&successor.addr(), &next_cmd).await {
                    warn!("eventual insert forward of '{key}' to {} failed: {e}", successor.addr());
                }
            });
            Ok(format!("Inserted '{key}': '{value}' (eventual)"))
        }
    }
}

/// Delete: identical propagation shape to insert, minus the value argument.
pub async fn handle_delete(node: Arc<Node>, key: String, replica_count: Option<u32>) -> CoreResult<String> {
    let RingConfig { k, mode } = node.config();
    let replica_count = replica_count.unwrap_or(0);
    let target = hash(&key);

    if replica_count == 0 && !node.responsible_for(target) {
        let successor = node.successor();
        let cmd = format!("delete \"{key}\" 0");
        return peer::call(&successor.addr(), &cmd).await;
    }

    if replica_count >= k {
        return Err(CoreError::ReplicationLimitReached);
    }

    node.with_store(|store| store.delete(&key));

    if replica_count + 1 >= k {
        return Ok(format!("Deleted '{key}'"));
    }

    let successor = node.successor();
    let next_cmd = format!("delete \"{key}\" {}", replica_count + 1);

    match mode {
        Consistency::Chain => peer::call(&successor.addr(), &next_cmd).await,
        Consistency::Eventual => {
            tokio::spawn(async move {
                tokio::time::sleep(EVENTUAL_REPLICATION_DELAY).await;
                if let Err(e) = peer::call(&successor.addr(), &next_cmd).await {
                    warn!("eventual delete forward of '{key}' to {} failed: {e}", successor.addr());
                }
            });
            Ok(format!("Deleted '{key}' (eventual)"))
        }
    }
}

/// Queries. `query *` is delegated to the ring-wide aggregation shared with
/// `overlay`/`reset_config`.
pub async fn handle_query(
    node: &Node,
    key: &str,
    hop: Option<u32>,
    initial_node: Option<u64>,
) -> CoreResult<String> {
    if key == "*" {
        return broadcast::aggregate_query(node, initial_node).await;
    }

    let RingConfig { k, mode } = node.config();
    let target = hash(key);

    match mode {
        Consistency::Chain => {
            // Routing phase: a chain read must reach the primary before the
            // hop-counted chain walk starts, so a non-primary forwards
            // unconditionally here. An eventual-mode node never takes this
            // branch -- it answers from its own replica if it has one.
            if hop.is_none() && initial_node.is_none() && !node.responsible_for(target) {
                let successor = node.successor();
                let cmd = format!("query \"{key}\"");
                return peer::call(&successor.addr(), &cmd).await;
            }
            let hop = hop.unwrap_or(0);
            if hop + 1 < k {
                let successor = node.successor();
                let cmd = format!("query \"{key}\" {}", hop + 1);
                peer::call(&successor.addr(), &cmd).await
            } else {
                Ok(node.with_store(|store| store.query_or_not_found(key)))
            }
        }
        Consistency::Eventual => {
            if let Some(value) = node.with_store(|store| store.query(key)) {
                return Ok(value);
            }
            let initial = initial_node.unwrap_or_else(|| node.id());
            let successor = node.successor();
            if successor.id == initial {
                return Ok(KEY_NOT_FOUND.to_string());
            }
            let cmd = format!("query \"{key}\" 0 {initial}");
            peer::call(&successor.addr(), &cmd).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn singleton(k: u32, mode: Consistency) -> Node {
        Node::new("127.0.0.1", 5000, true, k, mode)
    }

    #[tokio::test]
    async fn insert_on_singleton_applies_locally_and_acks() {
        let node = Arc::new(singleton(1, Consistency::Chain));
        let reply = handle_insert(Arc::clone(&node), "alpha".to_string(), "v1".to_string(), None)
            .await
            .unwrap();
        assert!(reply.contains("Inserted"));
        assert_eq!(node.with_store(|s| s.query("alpha")), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn query_missing_key_on_singleton_chain_reports_not_found() {
        let node = Node::new("127.0.0.1", 5000, true, 1, Consistency::Chain);
        let reply = handle_query(&node, "ghost", None, None).await.unwrap();
        assert_eq!(reply, KEY_NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_on_singleton_removes_value() {
        let node = Arc::new(singleton(1, Consistency::Eventual));
        handle_insert(Arc::clone(&node), "alpha".to_string(), "v1".to_string(), None)
            .await
            .unwrap();
        handle_delete(Arc::clone(&node), "alpha".to_string(), None).await.unwrap();
        assert_eq!(node.with_store(|s| s.query("alpha")), None);
    }

    #[tokio::test]
    async fn insert_over_replication_limit_is_rejected() {
        let node = Arc::new(singleton(2, Consistency::Chain));
        let err = handle_insert(Arc::clone(&node), "alpha".to_string(), "v1".to_string(), Some(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ReplicationLimitReached));
    }

    #[tokio::test]
    async fn eventual_query_answers_from_a_held_replica_even_when_not_the_primary() {
        use crate::node::peer::PeerRef;

        let node = Node::new("127.0.0.1", 5000, true, 3, Consistency::Eventual);
        // Narrow this node's own arc down to a single point so it holds
        // "alpha" only as a replica, not as primary -- and critically,
        // never has a successor to forward to if the routing gate fires.
        node.set_predecessor(PeerRef {
            ip: "10.0.0.9".to_string(),
            port: 1,
            id: node.id().wrapping_sub(1),
        });
        node.with_store(|s| s.insert("alpha".to_string(), "v1".to_string(), 1));

        let reply = handle_query(&node, "alpha", None, None).await.unwrap();
        assert_eq!(reply, "v1");
    }
}

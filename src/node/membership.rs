use std::collections::HashMap;

use log::{info, warn};

use crate::node::peer::{self, PeerRef};
use crate::node::state::Node;
use crate::node::store::Record;
use crate::utils::error::{CoreError, CoreResult};
use crate::utils::types::Consistency;

const NONE_SENTINEL: &str = "None";

fn parse_network_config(reply: &str) -> CoreResult<(u32, Consistency)> {
    let (k, mode) = reply
        .trim()
        .split_once(':')
        .ok_or_else(|| CoreError::Protocol(format!("malformed network config reply: {reply}")))?;
    let k: u32 = k
        .parse()
        .map_err(|_| CoreError::Protocol(format!("malformed replication factor: {k}")))?;
    let mode: Consistency = mode
        .parse()
        .map_err(|e| CoreError::Protocol(format!("malformed consistency mode: {e}")))?;
    Ok((k, mode))
}

/// Asks the bootstrap for the network-wide `(k, mode)` before this node's own
/// `Node` aggregate is constructed.
pub async fn fetch_network_config(bootstrap_addr: &str) -> CoreResult<(u32, Consistency)> {
    let reply = peer::call(bootstrap_addr, "get_network_config").await?;
    parse_network_config(&reply)
}

/// Resolves this node's successor and predecessor via the bootstrap, wires
/// up pointers on both sides, then pulls the key handoff. Called once, after
/// the `Node` has already adopted `(k, mode)` from [`fetch_network_config`].
pub async fn join_ring(node: &Node, bootstrap_addr: &str) -> CoreResult<()> {
    let self_addr = node.self_ref.addr();

    // step 2
    let find_cmd = format!("find_successor {}", node.id());
    let succ_reply = peer::call(bootstrap_addr, &find_cmd).await?;
    let successor = peer::parse_addr(&succ_reply)?;

    // step 3
    let pred_reply = peer::call(&successor.addr(), "get_predecessor").await?;
    let pred_reply = pred_reply.trim();

    node.set_successor(successor.clone());

    // step 4
    if pred_reply == NONE_SENTINEL {
        node.set_predecessor(successor.clone());
        peer::call(&successor.addr(), &format!("update_successor {self_addr}")).await?;
    } else {
        let predecessor = peer::parse_addr(pred_reply)?;
        node.set_predecessor(predecessor.clone());
        peer::call(&predecessor.addr(), &format!("update_successor {self_addr}")).await?;
    }

    // step 5
    peer::call(&successor.addr(), &format!("update_predecessor {self_addr}")).await?;

    info!(
        "[{}] joined ring via {bootstrap_addr}: predecessor={} successor={}",
        node.short_id(),
        node.predecessor().addr(),
        node.successor().addr()
    );

    // step 6
    let transfer_cmd = format!("transfer_keys {}", node.id());
    let reply = peer::call(&successor.addr(), &transfer_cmd).await?;
    let records: HashMap<String, Record> =
        serde_json::from_str(&reply).map_err(|e| CoreError::JoinHandoff(e.to_string()))?;
    let received = records.len();
    node.with_store(|store| {
        for (key, record) in records {
            store.put_record(key, record);
        }
    });
    info!("[{}] received {received} handed-off keys from {}", node.short_id(), successor.addr());

    Ok(())
}

/// Server side of `update_predecessor`/`update_successor`: replace the
/// corresponding pointer and ack.
pub fn handle_update_predecessor(node: &Node, peer_ref: PeerRef) -> String {
    node.set_predecessor(peer_ref);
    "ACK".to_string()
}

pub fn handle_update_successor(node: &Node, peer_ref: PeerRef) -> String {
    node.set_successor(peer_ref);
    "ACK".to_string()
}

pub fn handle_get_predecessor(node: &Node) -> String {
    let predecessor = node.predecessor();
    if predecessor.id == node.id() {
        NONE_SENTINEL.to_string()
    } else {
        predecessor.addr()
    }
}

pub fn handle_get_network_config(node: &Node) -> String {
    let config = node.config();
    format!("{}:{}", config.k, config.mode)
}

/// Server side of `transfer_keys`: computes the set handed to the new
/// predecessor -- every primary-owned record that no longer falls under this
/// node now that its predecessor pointer has moved to `new_pred_id` (wired up
/// in `join_ring` step 5, before this call), plus every replica record
/// (`hop > 0`) this node holds regardless of arc. The joiner gets a snapshot
/// of that set at its current hop values; this node then ages its own
/// retained copies in place (a surrendered primary becomes this node's first
/// replica, an existing replica moves one hop further out), dropping
/// anything that now exceeds `k-1`.
///
/// `new_pred_id` isn't consulted directly here: by the time this handler
/// runs, `node.predecessor()` already *is* the joiner, so `responsible_for`
/// answers "does this key now belong to the joiner instead of me" on its
/// own. The parameter stays for wire-protocol symmetry with the client side.
pub async fn handle_transfer_keys(node: &Node, _new_pred_id: u64) -> CoreResult<String> {
    let k = node.config().k;
    let handed_off: HashMap<String, Record> = node.with_store(|store| {
        store
            .iter()
            .filter(|(key, record)| {
                let target = crate::utils::crypto::hash(key);
                (record.hop == 0 && !node.responsible_for(target)) || record.hop > 0
            })
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    });
    let keys: Vec<String> = handed_off.keys().cloned().collect();
    let changed = node.with_store(|store| store.increment_hops(&keys, k.saturating_sub(1)));
    if changed {
        propagate_increment_hop(node, keys.clone());
    }

    serde_json::to_string(&handed_off).map_err(|e| CoreError::JoinHandoff(e.to_string()))
}

/// Fires the downstream `increment_hop` lap in the background so
/// `transfer_keys` can ack the joiner immediately; the lap itself stops at
/// the first node whose store doesn't change.
fn propagate_increment_hop(node: &Node, keys: Vec<String>) {
    let successor = node.successor();
    if successor.id == node.id() {
        return;
    }
    tokio::spawn(async move {
        let cmd = format!(
            "increment_hop {}",
            serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string())
        );
        if let Err(e) = peer::call(&successor.addr(), &cmd).await {
            warn!("increment_hop propagation to {} failed: {e}", successor.addr());
        }
    });
}

/// Server side of `increment_hop`: apply the aging step locally, skipping
/// any key this node holds at `hop == 0` (an unrelated primary copy, never
/// aged by someone else's handoff walk). If nothing changed the fixed point
/// has been reached and the lap stops here.
pub async fn handle_increment_hop(node: &Node, keys: Vec<String>) -> CoreResult<String> {
    let k = node.config().k;
    let changed = node.with_store(|store| store.age_replicas(&keys, k.saturating_sub(1)));
    if changed {
        propagate_increment_hop(node, keys);
    }
    Ok("ACK".to_string())
}

/// Server side of `receive_keys`: reconcile an incoming departing node's
/// store against this node's own, then forward the accepted set onward so
/// further replicas decrement too.
pub async fn handle_receive_keys(node: &Node, incoming: HashMap<String, Record>) -> CoreResult<String> {
    let mut accepted: HashMap<String, Record> = HashMap::new();

    node.with_store(|store| {
        for (key, mut record) in incoming {
            if let Some(existing) = store.get(&key) {
                let mut decremented = existing.clone();
                decremented.hop = decremented.hop.saturating_sub(1);
                store.put_record(key.clone(), decremented.clone());
                accepted.insert(key, decremented);
            } else {
                record.hop = record.hop.saturating_sub(1);
                store.put_record(key.clone(), record.clone());
                accepted.insert(key, record);
            }
        }
    });

    if !accepted.is_empty() {
        let successor = node.successor();
        if successor.id != node.id() {
            let payload = serde_json::to_string(&accepted).unwrap_or_else(|_| "{}".to_string());
            tokio::spawn(async move {
                let cmd = format!("receive_keys {payload}");
                if let Err(e) = peer::call(&successor.addr(), &cmd).await {
                    warn!("receive_keys propagation to {} failed: {e}", successor.addr());
                }
            });
        }
    }

    Ok("ACK".to_string())
}

/// Client side of leaving the ring: hand the full local store to the
/// successor, then fix up the predecessor/successor pointers on both
/// neighbors.
pub async fn depart(node: &Node) -> CoreResult<()> {
    let successor = node.successor();
    let predecessor = node.predecessor();

    if successor.id == node.id() {
        info!("[{}] departing a singleton ring, nothing to hand off", node.short_id());
        return Ok(());
    }

    let store_snapshot: HashMap<String, Record> =
        node.with_store(|store| store.as_map().clone());
    let payload = serde_json::to_string(&store_snapshot).map_err(|e| CoreError::JoinHandoff(e.to_string()))?;
    peer::call(&successor.addr(), &format!("receive_keys {payload}")).await?;

    peer::call(&predecessor.addr(), &format!("update_successor {}", successor.addr())).await?;
    peer::call(&successor.addr(), &format!("update_predecessor {}", predecessor.addr())).await?;

    info!("[{}] departed ring", node.short_id());
    Ok(())
}

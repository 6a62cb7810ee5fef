use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::node::peer::{self, PeerRef};
use crate::node::state::Node;
use crate::node::store::Record;
use crate::node::{broadcast, membership, replication};
use crate::utils::constants::MAX_LINE_BYTES;
use crate::utils::error::{CoreError, CoreResult};
use crate::utils::types::Consistency;
use crate::utils::{codec, types};

/// Binds the listening socket and spawns one handler task per inbound
/// connection for the lifetime of the process.
pub async fn run(node: Arc<Node>) -> std::io::Result<()> {
    let listener = TcpListener::bind(node.self_ref.addr()).await?;
    info!("[{}] listening on {}", node.short_id(), node.self_ref.addr());

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(node, stream).await {
                error!("connection from {peer_addr} failed: {e}");
            }
        });
    }
}

async fn handle_connection(node: Arc<Node>, mut stream: TcpStream) -> std::io::Result<()> {
    let mut line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Ok(());
        }
    }
    let line = line.trim_end_matches(['\n', '\r']);

    let reply = if line.len() > MAX_LINE_BYTES {
        CoreError::Protocol("command line too long".to_string()).as_wire_reply()
    } else {
        let tokens = codec::tokenize(line);
        debug!("[{}] <- {line}", node.short_id());
        dispatch(&node, tokens).await
    };

    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn to_reply(result: CoreResult<String>) -> String {
    result.unwrap_or_else(|e| e.as_wire_reply())
}

fn arg(tokens: &[String], i: usize) -> CoreResult<&str> {
    tokens
        .get(i)
        .map(|s| s.as_str())
        .ok_or_else(|| CoreError::Protocol(format!("missing argument at position {i}")))
}

fn parse_u64(s: &str) -> CoreResult<u64> {
    s.parse()
        .map_err(|_| CoreError::Protocol(format!("expected an integer id, got '{s}'")))
}

fn parse_u32(s: &str) -> CoreResult<u32> {
    s.parse()
        .map_err(|_| CoreError::Protocol(format!("expected an integer, got '{s}'")))
}

fn parse_u16(s: &str) -> CoreResult<u16> {
    s.parse()
        .map_err(|_| CoreError::Protocol(format!("expected a port number, got '{s}'")))
}

/// Dispatches one parsed command line to the subsystem that owns it.
/// Unknown commands are the one reply that is never wrapped in the
/// `ERROR:`/typed-error machinery.
async fn dispatch(node: &Arc<Node>, tokens: Vec<String>) -> String {
    let Some(cmd) = tokens.first().map(|s| s.as_str()) else {
        return "Invalid command".to_string();
    };

    match cmd {
        "find_successor" => to_reply(dispatch_find_successor(node, &tokens).await),
        "get_predecessor" => membership::handle_get_predecessor(node),
        "update_predecessor" => to_reply(dispatch_update_predecessor(node, &tokens)),
        "update_successor" => to_reply(dispatch_update_successor(node, &tokens)),
        "get_network_config" => membership::handle_get_network_config(node),
        "transfer_keys" => to_reply(dispatch_transfer_keys(node, &tokens).await),
        "receive_keys" => to_reply(dispatch_receive_keys(node, &tokens).await),
        "increment_hop" => to_reply(dispatch_increment_hop(node, &tokens).await),
        "insert" => to_reply(dispatch_insert(node, &tokens).await),
        "delete" => to_reply(dispatch_delete(node, &tokens).await),
        "query" => to_reply(dispatch_query(node, &tokens).await),
        "overlay" => to_reply(dispatch_overlay(node, &tokens).await),
        "reset_config" => to_reply(dispatch_reset_config(node, &tokens).await),
        "get_data" => to_reply(dispatch_get_data(node, &tokens)),
        _ => "Invalid command".to_string(),
    }
}

async fn dispatch_find_successor(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let id = parse_u64(arg(tokens, 1)?)?;
    let successor = node.find_successor(id).await?;
    Ok(successor.addr())
}

fn dispatch_update_predecessor(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let peer_ref = parse_peer(tokens)?;
    Ok(membership::handle_update_predecessor(node, peer_ref))
}

fn dispatch_update_successor(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let peer_ref = parse_peer(tokens)?;
    Ok(membership::handle_update_successor(node, peer_ref))
}

fn parse_peer(tokens: &[String]) -> CoreResult<PeerRef> {
    let ip = arg(tokens, 1)?;
    let port = parse_u16(arg(tokens, 2)?)?;
    Ok(PeerRef::new(ip, port))
}

async fn dispatch_transfer_keys(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let new_pred_id = parse_u64(arg(tokens, 1)?)?;
    membership::handle_transfer_keys(node, new_pred_id).await
}

async fn dispatch_receive_keys(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let payload = arg(tokens, 1)?;
    let records: HashMap<String, Record> = serde_json::from_str(payload)
        .map_err(|e| CoreError::Protocol(format!("malformed receive_keys payload: {e}")))?;
    membership::handle_receive_keys(node, records).await
}

async fn dispatch_increment_hop(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let payload = arg(tokens, 1)?;
    let keys: Vec<String> = serde_json::from_str(payload)
        .map_err(|e| CoreError::Protocol(format!("malformed increment_hop payload: {e}")))?;
    membership::handle_increment_hop(node, keys).await
}

async fn dispatch_insert(node: &Arc<Node>, tokens: &[String]) -> CoreResult<String> {
    let key = arg(tokens, 1)?.to_string();
    let value = arg(tokens, 2)?.to_string();
    let replica_count = match tokens.get(3) {
        Some(s) => Some(parse_u32(s)?),
        None => None,
    };
    replication::handle_insert(Arc::clone(node), key, value, replica_count).await
}

async fn dispatch_delete(node: &Arc<Node>, tokens: &[String]) -> CoreResult<String> {
    let key = arg(tokens, 1)?.to_string();
    let replica_count = match tokens.get(2) {
        Some(s) => Some(parse_u32(s)?),
        None => None,
    };
    replication::handle_delete(Arc::clone(node), key, replica_count).await
}

async fn dispatch_query(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let key = arg(tokens, 1)?;
    if key == "*" {
        let initial = match tokens.get(2) {
            Some(s) => Some(parse_u64(s)?),
            None => None,
        };
        return replication::handle_query(node, "*", None, initial).await;
    }
    let hop = match tokens.get(2) {
        Some(s) => Some(parse_u32(s)?),
        None => None,
    };
    let initial_node = match tokens.get(3) {
        Some(s) => Some(parse_u64(s)?),
        None => None,
    };
    replication::handle_query(node, key, hop, initial_node).await
}

async fn dispatch_overlay(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let initial = match tokens.get(1) {
        Some(s) => Some(parse_u64(s)?),
        None => None,
    };
    broadcast::overlay(node, initial).await
}

async fn dispatch_reset_config(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let k = parse_u32(arg(tokens, 1)?)?;
    let mode: Consistency = arg(tokens, 2)?
        .parse()
        .map_err(|e| CoreError::Protocol(format!("malformed consistency mode: {e}")))?;
    let initial = match tokens.get(3) {
        Some(s) => Some(parse_u64(s)?),
        None => None,
    };
    broadcast::reset_config(node, k, mode, initial).await
}

/// Debug introspection only: answers for this node's own id, never forwards
/// to another node for a foreign id.
fn dispatch_get_data(node: &Node, tokens: &[String]) -> CoreResult<String> {
    let id_arg = arg(tokens, 1)?;
    let full_id = node.id().to_string();
    let short = types::short_id(node.id());
    if id_arg != full_id && id_arg != short {
        return Err(CoreError::Protocol(format!(
            "id {id_arg} does not match this node ({full_id})"
        )));
    }
    let data = node.with_store(|store| store.as_map().clone());
    serde_json::to_string(&serde_json::json!({ "node_id": node.id(), "data": data }))
        .map_err(|e| CoreError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn node() -> Arc<Node> {
        Arc::new(Node::new("127.0.0.1", 5000, true, 3, Consistency::Chain))
    }

    #[tokio::test]
    async fn unknown_command_yields_invalid_command() {
        let n = node();
        let reply = dispatch(&n, vec!["frobnicate".to_string()]).await;
        assert_eq!(reply, "Invalid command");
    }

    #[tokio::test]
    async fn empty_command_yields_invalid_command() {
        let n = node();
        let reply = dispatch(&n, vec![]).await;
        assert_eq!(reply, "Invalid command");
    }

    #[tokio::test]
    async fn insert_then_query_round_trips_on_singleton() {
        let n = node();
        let insert_reply = dispatch(
            &n,
            vec!["insert".to_string(), "alpha".to_string(), "v1".to_string()],
        )
        .await;
        assert!(insert_reply.contains("Inserted"));
        let query_reply = dispatch(&n, vec!["query".to_string(), "alpha".to_string()]).await;
        assert_eq!(query_reply, "v1");
    }

    #[tokio::test]
    async fn get_data_rejects_foreign_id() {
        let n = node();
        let reply = dispatch(&n, vec!["get_data".to_string(), "999999".to_string()]).await;
        assert!(reply.starts_with("ERROR"));
    }

    #[tokio::test]
    async fn get_data_accepts_own_short_id() {
        let n = node();
        let short = types::short_id(n.id());
        let reply = dispatch(&n, vec!["get_data".to_string(), short]).await;
        assert!(reply.contains("node_id"));
    }
}

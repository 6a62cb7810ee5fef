use log::warn;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::utils::constants::PEER_CALL_TIMEOUT;
use crate::utils::crypto::hash;
use crate::utils::error::{CoreError, CoreResult};
use crate::utils::types::NodeId;

/// A remote node reference: `(ip, port, id)`. Equality is by id. A fresh
/// `PeerRef` is constructed whenever a pointer is updated; it carries no
/// lifetime or connection state of its own beyond the local field that holds
/// it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PeerRef {
    pub ip: String,
    pub port: u16,
    pub id: NodeId,
}

impl PeerRef {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        let ip = ip.into();
        let id = hash(&format!("{ip}:{port}"));
        PeerRef { ip, port, id }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Parses a `ip:port` wire token into a [`PeerRef`], recomputing its id the
/// same way [`PeerRef::new`] does. Used to turn `find_successor`/
/// `get_predecessor` replies back into addressable peers.
pub fn parse_addr(addr: &str) -> CoreResult<PeerRef> {
    let addr = addr.trim();
    let (ip, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| CoreError::Protocol(format!("malformed peer address: {addr}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| CoreError::Protocol(format!("malformed port in peer address: {addr}")))?;
    Ok(PeerRef::new(ip, port))
}

impl PartialEq for PeerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerRef {}

/// Opens a fresh TCP connection to `addr`, writes `command` as a single
/// line, reads the complete reply until the peer closes its write side, and
/// closes the connection. Bounded by [`PEER_CALL_TIMEOUT`]; never retried.
pub async fn call(addr: &str, command: &str) -> CoreResult<String> {
    let attempt = async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| CoreError::Transport(format!("connect to {addr} failed: {e}")))?;

        let mut line = command.to_string();
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CoreError::Transport(format!("write to {addr} failed: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| CoreError::Transport(format!("shutdown write to {addr} failed: {e}")))?;

        let mut reply = String::new();
        stream
            .read_to_string(&mut reply)
            .await
            .map_err(|e| CoreError::Transport(format!("read from {addr} failed: {e}")))?;
        Ok(reply)
    };

    match timeout(PEER_CALL_TIMEOUT, attempt).await {
        Ok(result) => result,
        Err(_) => {
            warn!("peer call to {addr} timed out after {PEER_CALL_TIMEOUT:?}: {command}");
            Err(CoreError::Transport(format!("timed out calling {addr}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_ref_equality_is_by_id_only() {
        let a = PeerRef::new("127.0.0.1", 5000);
        let b = PeerRef {
            ip: "10.0.0.1".to_string(),
            port: 9999,
            id: a.id,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn peer_ref_addr_formats_ip_colon_port() {
        let p = PeerRef::new("127.0.0.1", 5000);
        assert_eq!(p.addr(), "127.0.0.1:5000");
    }

    #[test]
    fn parse_addr_round_trips_with_peer_ref_new() {
        let parsed = parse_addr("127.0.0.1:5000").unwrap();
        let built = PeerRef::new("127.0.0.1", 5000);
        assert_eq!(parsed, built);
        assert_eq!(parsed.addr(), "127.0.0.1:5000");
    }

    #[test]
    fn parse_addr_rejects_missing_port() {
        assert!(parse_addr("127.0.0.1").is_err());
    }
}

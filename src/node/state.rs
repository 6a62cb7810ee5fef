use std::sync::Mutex;

use log::debug;

use crate::node::peer::{self, PeerRef};
use crate::utils::error::CoreResult;
use crate::node::store::KeyStore;
use crate::utils::types::{short_id, Consistency, KeyId, NodeId};

/// Predecessor/successor pointer pair. On a singleton ring both point back
/// at the owning node.
#[derive(Debug, Clone)]
pub struct RingPointers {
    pub predecessor: PeerRef,
    pub successor: PeerRef,
}

/// The network-wide replication settings, set by the bootstrap node and
/// adopted by every joiner via `get_network_config`.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    pub k: u32,
    pub mode: Consistency,
}

/// Identity plus the three pieces of mutable state a handler touches, each
/// behind its own lock so forwarding never has to hold more than one at a
/// time.
#[derive(Debug)]
pub struct Node {
    pub self_ref: PeerRef,
    pub is_bootstrap: bool,
    pointers: Mutex<RingPointers>,
    config: Mutex<RingConfig>,
    store: Mutex<KeyStore>,
}

impl Node {
    pub fn new(ip: impl Into<String>, port: u16, is_bootstrap: bool, k: u32, mode: Consistency) -> Self {
        let self_ref = PeerRef::new(ip, port);
        let pointers = RingPointers {
            predecessor: self_ref.clone(),
            successor: self_ref.clone(),
        };
        Node {
            self_ref,
            is_bootstrap,
            pointers: Mutex::new(pointers),
            config: Mutex::new(RingConfig { k, mode }),
            store: Mutex::new(KeyStore::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.self_ref.id
    }

    pub fn short_id(&self) -> String {
        short_id(self.id())
    }

    pub fn predecessor(&self) -> PeerRef {
        self.pointers.lock().unwrap().predecessor.clone()
    }

    pub fn successor(&self) -> PeerRef {
        self.pointers.lock().unwrap().successor.clone()
    }

    pub fn set_predecessor(&self, peer: PeerRef) {
        debug!("[{}] predecessor -> {}", self.short_id(), peer.addr());
        self.pointers.lock().unwrap().predecessor = peer;
    }

    pub fn set_successor(&self, peer: PeerRef) {
        debug!("[{}] successor -> {}", self.short_id(), peer.addr());
        self.pointers.lock().unwrap().successor = peer;
    }

    /// True if this node is currently alone on the ring (both pointers are
    /// itself).
    pub fn is_singleton(&self) -> bool {
        let pointers = self.pointers.lock().unwrap();
        pointers.predecessor.id == self.id() && pointers.successor.id == self.id()
    }

    pub fn config(&self) -> RingConfig {
        *self.config.lock().unwrap()
    }

    pub fn set_config(&self, k: u32, mode: Consistency) {
        *self.config.lock().unwrap() = RingConfig { k, mode };
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&mut KeyStore) -> R) -> R {
        let mut store = self.store.lock().unwrap();
        f(&mut store)
    }

    /// True iff `h` falls in the (predecessor, self] arc, with the singleton
    /// ring and wrap-around cases folded in.
    pub fn responsible_for(&self, h: KeyId) -> bool {
        let pred_id = self.predecessor().id;
        let self_id = self.id();
        if pred_id == self_id {
            return true;
        }
        if pred_id < self_id {
            pred_id < h && h <= self_id
        } else {
            h > pred_id || h <= self_id
        }
    }

    /// Returns the successor to forward to, or `None` when this node is
    /// itself the successor of `id` and the caller should stop routing.
    pub fn next_hop_toward(&self, id: NodeId) -> Option<PeerRef> {
        let successor = self.successor();
        if self.is_singleton() {
            return None;
        }
        if in_arc_exclusive_inclusive(self.id(), successor.id, id) {
            None
        } else {
            Some(successor)
        }
    }

    /// Recursive ring walk, O(N) by design (no finger table).
    pub async fn find_successor(&self, id: NodeId) -> CoreResult<PeerRef> {
        match self.next_hop_toward(id) {
            None => Ok(self.successor()),
            Some(next) => {
                let cmd = format!("find_successor {id}");
                let reply = peer::call(&next.addr(), &cmd).await?;
                peer::parse_addr(&reply)
            }
        }
    }
}

/// Builds a `Node` with caller-chosen pointer ids instead of hash-derived
/// ones, so other modules' tests can pin exact ring arcs. `cfg(test)`-only.
#[cfg(test)]
pub(crate) fn test_node_with_id(self_id: NodeId, pred_id: NodeId, succ_id: NodeId, k: u32) -> Node {
    let addr = |id| PeerRef {
        ip: "10.0.0.1".to_string(),
        port: 1,
        id,
    };
    Node {
        self_ref: addr(self_id),
        is_bootstrap: true,
        pointers: Mutex::new(RingPointers {
            predecessor: addr(pred_id),
            successor: addr(succ_id),
        }),
        config: Mutex::new(RingConfig { k, mode: Consistency::Chain }),
        store: Mutex::new(KeyStore::new()),
    }
}

/// True iff `h` lies in the ring arc `(lo, hi]`, accounting for wraparound
/// when `lo >= hi`.
fn in_arc_exclusive_inclusive(lo: NodeId, hi: NodeId, h: NodeId) -> bool {
    if lo < hi {
        h > lo && h <= hi
    } else {
        h > lo || h <= hi
    }
}

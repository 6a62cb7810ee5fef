use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Position of a node or a key on the hash ring.
pub type NodeId = u64;

/// Alias kept distinct from [`NodeId`] at the type level even though both are
/// u64s reduced modulo 2^64 by the same hasher; they are never compared to
/// each other directly.
pub type KeyId = u64;

/// Replication consistency mode, set network-wide by the bootstrap node and
/// propagated to joiners via `get_network_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    Chain,
    Eventual,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::Chain => write!(f, "chain"),
            Consistency::Eventual => write!(f, "eventual"),
        }
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chain" => Ok(Consistency::Chain),
            "eventual" => Ok(Consistency::Eventual),
            other => Err(format!("unknown consistency mode: {other}")),
        }
    }
}

/// Returns the last 4 digits of a node id's decimal representation, the
/// short-id convention used by `overlay`, `reset_config` and `get_data`.
pub fn short_id(id: NodeId) -> String {
    let s = id.to_string();
    let start = s.len().saturating_sub(4);
    s[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_round_trips_through_display_and_from_str() {
        assert_eq!("chain".parse::<Consistency>().unwrap(), Consistency::Chain);
        assert_eq!(
            "Eventual".parse::<Consistency>().unwrap(),
            Consistency::Eventual
        );
        assert!("byzantine".parse::<Consistency>().is_err());
        assert_eq!(Consistency::Chain.to_string(), "chain");
    }

    #[test]
    fn short_id_keeps_last_four_digits() {
        assert_eq!(short_id(123456789), "6789");
        assert_eq!(short_id(42), "42");
    }
}

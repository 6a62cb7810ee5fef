use std::time::Duration;

/// Bounded connect+read timeout for every peer-to-peer call.
pub const PEER_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay before an eventual-mode replica forwards its write downstream,
/// giving the client-facing ack time to return before the baton passes on.
pub const EVENTUAL_REPLICATION_DELAY: Duration = Duration::from_millis(100);

/// Maximum ASCII line length accepted from a client before the connection is
/// treated as malformed input, well above the largest JSON argument blobs
/// a normal reply carries.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

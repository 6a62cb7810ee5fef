use thiserror::Error;

/// Typed failures for the core, matching the error kinds laid out in the
/// error handling design: transport, protocol, semantic, aggregation and
/// join-handoff. Every fallible core operation returns `Result<_, CoreError>`;
/// the per-connection handler is the only place that turns these into the
/// plain-string replies the wire protocol actually sends.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("Replication limit reached")]
    ReplicationLimitReached,

    #[error("aggregation anomaly: {0}")]
    Aggregation(String),

    #[error("join handoff error: {0}")]
    JoinHandoff(String),
}

impl CoreError {
    /// The exact string written back to the client for a failed command.
    /// `ReplicationLimitReached` keeps its original human-readable sentinel;
    /// everything else becomes a diagnostic prefixed with "ERROR:". A missed
    /// query is not an error at all -- it's the `KEY_NOT_FOUND` sentinel
    /// value returned as an `Ok` reply, so this type never needs to carry it.
    pub fn as_wire_reply(&self) -> String {
        match self {
            CoreError::ReplicationLimitReached => "Replication limit reached".to_string(),
            other => format!("ERROR: {other}"),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

//! Protocol-level errors. These map onto the "Protocol" and "Transient
//! transport" error kinds from `tickgate-core`'s taxonomy — callers in
//! `tickgate-data` are expected to convert with `From`/`.into()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("unknown packet payload length {0} (expected 8, 44, or 184)")]
    UnknownPacketLength(usize),

    #[error("websocket transport error: {0}")]
    Transport(String),

    #[error("upstream closed the connection with code {code}: {reason}")]
    ClosedByUpstream { code: u16, reason: String },

    #[error("authentication rejected (close code {0})")]
    AuthRejected(u16),

    #[error("json encode/decode error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntegrationError {
    /// Per §6.1: invalid tokens close the upstream socket with code 1008
    /// (policy violation).
    pub const AUTH_REJECT_CLOSE_CODE: u16 = 1008;
}

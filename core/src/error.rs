//! # Core error taxonomy
//!
//! [`GatewayError`] aggregates the six abstract error kinds from the
//! error handling design: transient transport, auth/credential, protocol,
//! contract/validation, resource, and fatal. Components map their
//! specific failures onto one of these kinds; propagation policy (what
//! gets retried locally vs. surfaced to a caller vs. only visible on
//! `/health`) is the caller's responsibility, not this enum's.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Central error type threaded through the gateway's public APIs.
///
/// Every variant carries enough context to format a useful log line or
/// caller-facing `detail` string without leaking credentials (account
/// credentials are never placed in an error's `Display`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Error)]
pub enum GatewayError {
    /// Socket drop, timeout, 5xx, rate limit — retried with backoff at
    /// the component level; never surfaced to end users without exhausting
    /// attempts.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// Expired token, rejected login. Routes to the Token Refresher;
    /// persistent failure escalates the account to `INVALID_TOKEN`/`OFF`.
    #[error("auth/credential error: {0}")]
    Auth(String),

    /// Malformed frame, unknown token, schema violation. Packet dropped,
    /// counter incremented; no component state change.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid order fields, unknown instrument, insufficient scope.
    /// Fails fast with no retry.
    #[error("contract/validation error: {kind}: {detail}")]
    Contract {
        /// Stable machine-readable kind, e.g. `"unknown_instrument"`.
        kind: String,
        detail: String,
    },

    /// Queue full, cache full, too many tokens for an account. Caller
    /// must decide how to proceed.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// Corrupted registry, missing required config. The offending
    /// account/component shuts down cleanly; the process continues if
    /// other accounts remain viable.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The receiving side of an internal channel was dropped — a task
    /// exited while another still held a sender to it.
    #[error("receiver dropped")]
    RxDropped,

    /// An async task panicked or was cancelled while being joined.
    #[error("join error: {0}")]
    Join(String),
}

impl GatewayError {
    /// `true` for kinds the error-handling design says must never retry
    /// automatically (contract/validation, fatal).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Contract { .. } | Self::Fatal(_))
    }

    /// `true` for kinds that are safe to retry with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Resource(_))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GatewayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::RxDropped
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(value.to_string())
    }
}

/// Result alias used throughout the gateway's crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_and_fatal_are_terminal() {
        assert!(GatewayError::Contract {
            kind: "unknown_instrument".into(),
            detail: "token 99 not found".into()
        }
        .is_terminal());
        assert!(GatewayError::Fatal("corrupt registry".into()).is_terminal());
        assert!(!GatewayError::Transient("timeout".into()).is_terminal());
    }

    #[test]
    fn transient_and_resource_are_retriable() {
        assert!(GatewayError::Transient("timeout".into()).is_retriable());
        assert!(GatewayError::Resource("queue_full".into()).is_retriable());
        assert!(!GatewayError::Auth("expired".into()).is_retriable());
    }
}

//! Order Executor error taxonomy — maps §7's six-way split onto this
//! crate's concerns. `tickgate-risk`'s contract/validation errors fold in
//! as-is; broker RPC failures are classified retriable/non-retriable by
//! the caller supplying them (the broker client, §6.3, is external).

use thiserror::Error;

use tickgate_risk::RiskError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Contract/validation failure from `tickgate-risk`; fails fast, no
    /// task is created.
    #[error("validation failed: {0}")]
    Validation(#[from] RiskError),

    /// §4.7 "open: reject new tasks for that account with `circuit_open`".
    #[error("circuit_open: account {0} is not accepting dispatches")]
    CircuitOpen(String),

    /// §5 "Per-account order queue: 10 000 requests; overflow rejects
    /// with `queue_full`".
    #[error("queue_full: account {0} has reached its order queue bound")]
    QueueFull(String),

    /// The account actor task has exited (e.g. during shutdown) and the
    /// queue send failed.
    #[error("account {0} is not accepting orders (actor not running)")]
    ActorUnavailable(String),
}

impl ExecutionError {
    /// Stable machine-readable kind, for a caller-facing structured
    /// error per §7 "Contract and resource errors propagate to the
    /// caller with structured error kind".
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.kind(),
            Self::CircuitOpen(_) => "circuit_open",
            Self::QueueFull(_) => "queue_full",
            Self::ActorUnavailable(_) => "actor_unavailable",
        }
    }
}

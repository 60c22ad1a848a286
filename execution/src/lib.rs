#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Execution — the Order Executor
//!
//! Idempotent, per-account-serialized order dispatch (spec §4.7): one
//! FIFO actor per account, a [`circuit_breaker::CircuitBreaker`](tickgate_core::circuit_breaker::CircuitBreaker)
//! per account to fail fast on a sick broker, retry-with-backoff before
//! failover, failover across an ordered account chain, and a
//! dead-letter channel once that chain is exhausted.
//!
//! [`check::validate`](tickgate_risk::check::validate) runs first and
//! fails fast with no task created; everything past that point is
//! durable in a [`store::TaskStore`] keyed by a task id derived the same
//! way `tickgate-integration` derives its own (see
//! [`idempotency`] for why this crate keeps its own copy instead of
//! depending on that crate).

/// Task-id derivation, independent of `tickgate-integration`'s copy.
pub mod idempotency;

/// `OrderTask` and its lifecycle states.
pub mod types;

/// This crate's error taxonomy, folding in `tickgate-risk`'s.
pub mod error;

/// The external broker order RPC seam.
pub mod broker;

/// Durable `task_id -> OrderTask` table.
pub mod store;

/// The `OrderExecutor` itself: per-account actors, retry, failover, DLQ.
pub mod executor;

pub use broker::{BrokerError, BrokerOrderClient};
pub use error::ExecutionError;
pub use executor::{OrderExecutor, OrderExecutorConfig, DEFAULT_QUEUE_CAPACITY};
pub use idempotency::{derive_task_id, TaskId};
pub use store::{InMemoryTaskStore, JsonlTaskStore, TaskStore};
pub use types::{OrderState, OrderTask};

//! # Shutdown management
//!
//! Traits for graceful shutdown of long-lived components (Session
//! Orchestrators, the Tick Bus, the Order Executor, the Token Refresher).
//! Per the concurrency model, graceful shutdown cancels each task
//! root-first; a task has at most 5s to drain before being aborted.

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Components that can shut down immediately without async operations.
pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

/// Components that need async operations during shutdown — draining a
/// queue, flushing a durable log, waiting for an in-flight dispatch to
/// finish.
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// A shutdown signal that can be sent through an event or control channel.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
pub struct Shutdown;

/// Deadline a task is granted to drain before it is aborted, per the
/// concurrency model's cancellation rule.
pub const GRACEFUL_SHUTDOWN_DEADLINE: std::time::Duration = std::time::Duration::from_secs(5);

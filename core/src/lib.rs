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

//! # Core — shared primitives
//!
//! Cross-cutting types depended on by every other crate in the gateway:
//! the aggregate [`GatewayError`](error::GatewayError), `tracing`-based
//! logging setup, graceful-shutdown traits, a [`Clock`](clock::Clock)
//! abstraction that lets timing-sensitive components (Mode Manager, Token
//! Refresher, Mock Ticker, reconnect backoff) run under a fake clock in
//! tests, and the [`CircuitBreaker`](circuit_breaker::CircuitBreaker)
//! state machine shared by the Order Executor and the Session
//! Orchestrator's repeated-auth-failure escalation.

/// Aggregate error taxonomy (transient transport, auth/credential,
/// protocol, contract/validation, resource, fatal) per the error handling
/// design.
pub mod error;

/// `tracing`-based logging init, human-readable and JSON variants.
pub mod logging;

/// [`SyncShutdown`](shutdown::SyncShutdown) / [`AsyncShutdown`](shutdown::AsyncShutdown)
/// traits for graceful component teardown.
pub mod shutdown;

/// [`Clock`](clock::Clock) abstraction: wall clock in production, a
/// deterministic fake clock in tests.
pub mod clock;

/// Shared closed/open/half-open failure-counting state machine.
pub mod circuit_breaker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::GatewayError;

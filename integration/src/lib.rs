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

//! # Integration — low-level wire protocol
//!
//! Everything that touches bytes on the wire lives here: the upstream
//! broker's length-framed binary tick protocol (§6.1), the outbound
//! subscribe/unsubscribe/mode control JSON, the downstream tick envelope
//! and client control messages (§6.2), and HMAC-based idempotency key
//! derivation (§9) shared by the Order Executor.
//!
//! The [`BrokerSocket`] trait is the seam between this codec and an
//! actual transport: [`ws::WsBrokerSocket`] drives a real
//! `tokio-tungstenite` connection; [`mock::MockBrokerSocket`] is an
//! in-memory double used by the Session Orchestrator's tests.

/// Errors raised while framing, parsing, or transporting protocol bytes.
pub mod error;

/// Upstream binary frame decode: packet-count header, per-packet
/// length-prefix, LTP/QUOTE/FULL dispatch by payload length.
pub mod wire;

/// Outbound subscribe/unsubscribe/mode control messages (§6.1).
pub mod control;

/// Downstream tick envelope and client subscribe/unsubscribe/error
/// messages (§6.2).
pub mod envelope;

/// HMAC-SHA256 idempotency key derivation (§9: `task_id = HMAC(secret,
/// idempotency_key || account_id)`).
pub mod idempotency;

/// [`BrokerSocket`] transport seam plus the real and mock implementations.
pub mod socket;

pub use error::IntegrationError;
pub use socket::BrokerSocket;

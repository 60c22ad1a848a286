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

//! # Service — the composition root
//!
//! Wires every other crate in the workspace into one running process
//! (§9): the [`config`] shape, the [`health`] report, a durable
//! [`token_store`], and the [`supervisor::Supervisor`] that owns the
//! account roster, the Tick Bus, the Subscription Reconciler, the Order
//! Executor, and the Token Refresher.

/// Typed `Config` shape for every §6.6 recognized key.
pub mod config;

/// §6.4 `GET /health` data shape and the pure function that computes it.
pub mod health;

/// Durable per-account token table.
pub mod token_store;

/// The `Supervisor` composition root.
pub mod supervisor;

pub use config::{Config, ConfigError};
pub use health::{compute_health, HealthReport, HealthStatus};
pub use supervisor::{ExternalCollaborators, Supervisor};
pub use token_store::{FsTokenStore, InMemoryTokenStore, TokenStore};

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

//! # Data — the tick pipeline
//!
//! Everything between an upstream socket and a downstream subscriber:
//! the [`mode_manager`] (LIVE/MOCK/OFF per account), the
//! [`normalizer`] (binary frame → canonical [`tick::Tick`]), the
//! [`greeks`] enricher (option Greeks on a pinned-by-token worker pool),
//! the [`bus`] (pub/sub fan-out with per-subscriber backpressure), the
//! [`reconciler`] (desired vs. current upstream subscriptions), the
//! [`orchestrator`] (per-account session state machine and Mock Ticker),
//! and the [`token_refresher`] (scheduled/preemptive/on-demand token
//! renewal).

/// Maps `tickgate-integration`'s wire errors onto `GatewayError`.
pub mod error;

/// Canonical `Tick` record (§3).
pub mod tick;

/// Tick Normalizer (§4.2).
pub mod normalizer;

/// Greeks Enricher (§4.3).
pub mod greeks;

/// Tick Bus (§4.6).
pub mod bus;

/// Mode Manager (§4.1).
pub mod mode_manager;

/// Subscription Reconciler (§4.4).
pub mod reconciler;

/// Subscriber interest consolidation feeding the Reconciler (§4.4 step 1).
pub mod interest;

/// Session Orchestrator and Mock Ticker (§4.5).
pub mod orchestrator;

/// Token Refresher (§4.8).
pub mod token_refresher;

pub use bus::TickBus;
pub use greeks::{GreeksConfig, GreeksEnricher};
pub use interest::InterestBook;
pub use mode_manager::ModeManager;
pub use normalizer::Normalizer;
pub use orchestrator::SessionOrchestrator;
pub use reconciler::SubscriptionReconciler;
pub use tick::Tick;
pub use token_refresher::TokenRefresher;

//! # Logging configuration
//!
//! Standardized `tracing` setup for the gateway. Two entry points:
//! human-readable for local development, JSON for aggregators. Both
//! honor `RUST_LOG` through an `EnvFilter` and default to `INFO`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tickgate_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("gateway starting");
//! }
//! ```
//!
//! ```bash
//! # Per-crate levels
//! export RUST_LOG=tickgate_data=debug,tickgate_execution=info
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize human-readable logging.
///
/// Safe to call once per process; a second call will panic because the
/// global subscriber can only be set once. Prefer calling this only from
/// `main`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize JSON logging, for shipping to a log aggregator.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init();
}

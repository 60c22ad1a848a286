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

//! # Markets — instrument & account data model
//!
//! Defines the [`Instrument`](instrument::Instrument) and
//! [`Account`](account::Account) records from the data model, plus the
//! read-mostly [`InstrumentRegistry`](registry::InstrumentRegistry) that
//! serves consistent copy-on-write snapshots to readers while a single
//! writer applies the daily instrument-dump refresh.

pub mod account;
pub mod instrument;
pub mod registry;
pub mod subscription;

pub use account::{Account, AccountId, Mode as AccountMode, TokenState, TokenStatus};
pub use instrument::{ExchangeSegment, Instrument, InstrumentKind, InstrumentStatus, Token};
pub use registry::InstrumentRegistry;
pub use subscription::{ConsumerId, Subscription, SubscriptionMode};

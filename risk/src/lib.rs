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

//! # Risk — contract/validation checks
//!
//! Everything in spec §7's "Contract/validation" error bucket for inbound
//! order placement: unknown instrument, non-positive quantity, a missing
//! price on a non-market order, a quantity that isn't a lot-size
//! multiple. These fail fast with a structured [`RiskError`] and are
//! never retried — the Order Executor (crate `tickgate-execution`) calls
//! [`check::validate`] before a task is ever created.
//!
//! This crate also owns the [`order_request::OrderRequest`] shape itself,
//! since the request being validated and the validation logic are the
//! same concern.

/// `OrderRequest` and its constituent enums (spec §3).
pub mod order_request;

/// The contract/validation error taxonomy bucket (spec §7).
pub mod error;

/// Free-function checks plus [`check::validate`], the entry point.
pub mod check;

pub use error::RiskError;
pub use order_request::{AttemptPolicy, OrderRequest, Product, Side, Validity, Variety};

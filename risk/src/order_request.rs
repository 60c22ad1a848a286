//! `OrderRequest` and its constituent fields (spec §3 "OrderRequest").
//!
//! This crate owns the request shape because validation (this crate's
//! job) and the shape being validated are the same concern; the Order
//! Executor crate consumes it without redefining it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tickgate_markets::{AccountId, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Broker product type (e.g. intraday margin vs. delivery). Kept as an
/// opaque string-backed enum rather than an exhaustive list — the set of
/// valid products is a broker detail this core does not police beyond
/// "non-empty", matching §1's framing of order placement as a pass-through
/// surface the core brokers, not a trading-rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Product {
    Intraday,
    Delivery,
    Margin,
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variety {
    Market,
    Limit,
    StopLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Validity {
    Day,
    Ioc,
}

/// Retry tuning carried on the request itself (spec §3); the Order
/// Executor's retry loop (crate `tickgate-execution`) reads these
/// instead of hard-coding one policy for every order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttemptPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub jitter_cap_ms: u64,
}

impl Default for AttemptPolicy {
    /// §4.7 defaults: `base=500ms`, cap 30s, default 5 attempts.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 500,
            jitter_cap_ms: 500,
        }
    }
}

/// Inbound order placement request (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_idempotency_key: String,
    pub account_id: AccountId,
    pub instrument_token: Token,
    pub side: Side,
    pub quantity: u32,
    /// Required unless `variety == Market`.
    pub price: Option<Decimal>,
    pub product: Product,
    pub variety: Variety,
    pub validity: Validity,
    pub attempt_policy: AttemptPolicy,
    /// Ordered failover chain (spec §3); the task retains its `task_id`
    /// across every account in this chain.
    pub failover_accounts: Vec<AccountId>,
}

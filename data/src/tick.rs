//! Canonical `Tick` record (§3) — the shape every consumer downstream of
//! the normalizer sees, regardless of which upstream tier produced it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tickgate_markets::Token;

/// Market-depth level: one side, one rung (FULL ticks only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: u32,
    pub orders: u16,
}

/// Computed option sensitivities, present only after the Greeks Enricher
/// has run and found a usable underlying spot (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub iv: Decimal,
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

/// One immutable market update for a single instrument token.
///
/// Ticks are never rewritten; a later tick with a greater `timestamp_us`
/// supersedes an earlier one for the same token. There is no ordering
/// promise across different tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub token: Token,
    pub timestamp_us: i64,
    pub last_price: Decimal,
    pub volume: Option<u32>,
    pub oi: Option<u32>,
    pub bid_price: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub bid_qty: Option<u32>,
    pub ask_qty: Option<u32>,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub greeks: Option<Greeks>,
    pub greeks_stale: bool,
    /// Set by the Mock Ticker (§4.5); absent for genuine upstream ticks.
    pub source_mock: bool,
}

impl Tick {
    /// Build a bare LTP-tier tick; QUOTE/FULL fields are filled in by the
    /// normalizer when the source packet carries them.
    pub fn ltp(token: Token, timestamp_us: i64, last_price: Decimal) -> Self {
        Self {
            token,
            timestamp_us,
            last_price,
            volume: None,
            oi: None,
            bid_price: None,
            ask_price: None,
            bid_qty: None,
            ask_qty: None,
            bids: Vec::new(),
            asks: Vec::new(),
            greeks: None,
            greeks_stale: false,
            source_mock: false,
        }
    }

    pub fn is_quote_or_richer(&self) -> bool {
        self.bid_price.is_some()
    }
}

//! Instrument data model (spec §3 "Instrument").
//!
//! `token` is the primary identity on the wire — an opaque 32-bit integer
//! assigned by the upstream broker — not the human-readable `symbol`.
//! Per `DESIGN.md` Open Question 1, `symbol` is display-only within this
//! core; joining by symbol across directory layouts (`NIFTY` vs
//! `NIFTY50`) is an external concern.

use chrono::NaiveDate;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque upstream instrument token. Unrelated to an access token.
pub type Token = u32;

/// Exchange and segment identifier, matching the segment codes real
/// Indian-market broker feeds encode on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ExchangeSegment {
    #[display("IDX_I")]
    IndexValue,
    #[display("NSE_EQ")]
    NseEquity,
    #[display("NSE_FNO")]
    NseFutOpt,
    #[display("NSE_CURRENCY")]
    NseCurrency,
    #[display("BSE_EQ")]
    BseEquity,
    #[display("BSE_FNO")]
    BseFutOpt,
    #[display("MCX_COMM")]
    McxCommodity,
}

/// Kind of instrument (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum InstrumentKind {
    Equity,
    Future,
    #[display("call-option")]
    CallOption,
    #[display("put-option")]
    PutOption,
    Index,
}

impl InstrumentKind {
    pub fn is_option(self) -> bool {
        matches!(self, Self::CallOption | Self::PutOption)
    }
}

/// Lifecycle status (spec §3 Instrument invariant: expired instruments
/// are removed from subscription candidacy within one refresh cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum InstrumentStatus {
    Active,
    Expired,
}

/// A tradable instrument as loaded from the daily-refreshed registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub token: Token,
    pub symbol: String,
    pub kind: InstrumentKind,
    pub exchange: ExchangeSegment,
    pub tick_size: Decimal,
    pub status: InstrumentStatus,

    /// Set only for options/futures.
    pub underlying_symbol: Option<String>,
    /// Set only for options.
    pub strike: Option<Decimal>,
    /// Set only for options/futures.
    pub expiry: Option<NaiveDate>,
    /// Set only for options/futures.
    pub lot_size: Option<u32>,
}

impl Instrument {
    /// Equity/index instrument constructor (no strike/expiry/lot_size).
    pub fn spot(
        token: Token,
        symbol: impl Into<String>,
        kind: InstrumentKind,
        exchange: ExchangeSegment,
        tick_size: Decimal,
    ) -> Self {
        Self {
            token,
            symbol: symbol.into(),
            kind,
            exchange,
            tick_size,
            status: InstrumentStatus::Active,
            underlying_symbol: None,
            strike: None,
            expiry: None,
            lot_size: None,
        }
    }

    /// Option contract constructor.
    #[allow(clippy::too_many_arguments)]
    pub fn option(
        token: Token,
        symbol: impl Into<String>,
        kind: InstrumentKind,
        underlying_symbol: impl Into<String>,
        strike: Decimal,
        expiry: NaiveDate,
        lot_size: u32,
        exchange: ExchangeSegment,
        tick_size: Decimal,
    ) -> Self {
        debug_assert!(kind.is_option());
        Self {
            token,
            symbol: symbol.into(),
            kind,
            exchange,
            tick_size,
            status: InstrumentStatus::Active,
            underlying_symbol: Some(underlying_symbol.into()),
            strike: Some(strike),
            expiry: Some(expiry),
            lot_size: Some(lot_size),
        }
    }

    /// Whether `today` has passed this instrument's `expiry`. Instruments
    /// with no expiry (equity, index) never expire by date.
    pub fn is_expired_as_of(&self, today: NaiveDate) -> bool {
        self.expiry.is_some_and(|expiry| expiry < today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn option_past_expiry_is_expired() {
        let inst = Instrument::option(
            1,
            "NIFTY25JAN26000CE",
            InstrumentKind::CallOption,
            "NIFTY",
            dec!(26000),
            NaiveDate::from_ymd_opt(2025, 1, 30).unwrap(),
            75,
            ExchangeSegment::NseFutOpt,
            dec!(0.05),
        );
        assert!(inst.is_expired_as_of(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
        assert!(!inst.is_expired_as_of(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()));
    }

    #[test]
    fn equity_never_expires() {
        let inst = Instrument::spot(
            2,
            "RELIANCE",
            InstrumentKind::Equity,
            ExchangeSegment::NseEquity,
            dec!(0.05),
        );
        assert!(!inst.is_expired_as_of(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()));
    }
}

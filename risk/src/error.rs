//! Contract/validation error taxonomy bucket (spec §7): invalid order
//! fields, unknown instrument, insufficient scope. Fails fast, never
//! retried — callers in `tickgate-execution` map this onto
//! `GatewayError::Contract`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    #[error("unknown instrument token {0}")]
    UnknownInstrument(u32),

    #[error("instrument token {0} has expired and is not tradable")]
    ExpiredInstrument(u32),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(u32),

    #[error("quantity {quantity} is not a multiple of lot size {lot_size}")]
    NotALotMultiple { quantity: u32, lot_size: u32 },

    #[error("price is required for {0:?} orders")]
    MissingPrice(crate::order_request::Variety),

    #[error("idempotency key must not be empty")]
    MissingIdempotencyKey,

    #[error("account_id must not be empty")]
    MissingAccountId,
}

impl RiskError {
    /// Stable machine-readable kind string, for mapping onto
    /// `GatewayError::Contract { kind, .. }`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownInstrument(_) => "unknown_instrument",
            Self::ExpiredInstrument(_) => "expired_instrument",
            Self::NonPositiveQuantity(_) => "non_positive_quantity",
            Self::NotALotMultiple { .. } => "not_a_lot_multiple",
            Self::MissingPrice(_) => "missing_price",
            Self::MissingIdempotencyKey => "missing_idempotency_key",
            Self::MissingAccountId => "missing_account_id",
        }
    }
}

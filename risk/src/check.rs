//! Contract/validation checks run on an [`OrderRequest`] before it
//! reaches the Order Executor (spec §7's "Contract/validation" bucket).
//!
//! Each check is a small free function rather than a trait object list —
//! the teacher's `risk/src/check/mod.rs` favors a flat function-per-rule
//! shape over a `Vec<Box<dyn Check>>` plugin surface, and this crate's
//! rule set is fixed by spec.md rather than user-extensible.

use tickgate_markets::{InstrumentRegistry, InstrumentStatus};

use crate::error::RiskError;
use crate::order_request::{OrderRequest, Variety};

/// Run every check in order, short-circuiting on the first failure —
/// matching the "fails fast" propagation policy in §7 (no partial
/// application, no accumulation of multiple violations).
pub fn validate(request: &OrderRequest, registry: &InstrumentRegistry) -> Result<(), RiskError> {
    check_idempotency_key(request)?;
    check_account_id(request)?;
    check_quantity_positive(request)?;
    check_price_present_for_non_market(request)?;
    let instrument = check_instrument_known(request, registry)?;
    check_instrument_active(&instrument)?;
    check_lot_size_multiple(request, &instrument)?;
    Ok(())
}

fn check_idempotency_key(request: &OrderRequest) -> Result<(), RiskError> {
    if request.client_idempotency_key.is_empty() {
        return Err(RiskError::MissingIdempotencyKey);
    }
    Ok(())
}

fn check_account_id(request: &OrderRequest) -> Result<(), RiskError> {
    if request.account_id.is_empty() {
        return Err(RiskError::MissingAccountId);
    }
    Ok(())
}

fn check_quantity_positive(request: &OrderRequest) -> Result<(), RiskError> {
    if request.quantity == 0 {
        return Err(RiskError::NonPositiveQuantity(request.quantity));
    }
    Ok(())
}

fn check_price_present_for_non_market(request: &OrderRequest) -> Result<(), RiskError> {
    if request.variety != Variety::Market && request.price.is_none() {
        return Err(RiskError::MissingPrice(request.variety));
    }
    Ok(())
}

fn check_instrument_known(
    request: &OrderRequest,
    registry: &InstrumentRegistry,
) -> Result<tickgate_markets::Instrument, RiskError> {
    registry
        .get(request.instrument_token)
        .ok_or(RiskError::UnknownInstrument(request.instrument_token))
}

fn check_instrument_active(instrument: &tickgate_markets::Instrument) -> Result<(), RiskError> {
    if instrument.status == InstrumentStatus::Expired {
        return Err(RiskError::ExpiredInstrument(instrument.token));
    }
    Ok(())
}

fn check_lot_size_multiple(
    request: &OrderRequest,
    instrument: &tickgate_markets::Instrument,
) -> Result<(), RiskError> {
    if let Some(lot_size) = instrument.lot_size {
        if lot_size > 0 && request.quantity % lot_size != 0 {
            return Err(RiskError::NotALotMultiple {
                quantity: request.quantity,
                lot_size,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_request::{AttemptPolicy, Product, Side, Validity};
    use rust_decimal_macros::dec;
    use tickgate_markets::{ExchangeSegment, Instrument, InstrumentKind};

    fn base_request() -> OrderRequest {
        OrderRequest {
            client_idempotency_key: "K1".into(),
            account_id: "primary".into(),
            instrument_token: 1,
            side: Side::Buy,
            quantity: 75,
            price: Some(dec!(100)),
            product: Product::Intraday,
            variety: Variety::Limit,
            validity: Validity::Day,
            attempt_policy: AttemptPolicy::default(),
            failover_accounts: Vec::new(),
        }
    }

    fn registry_with(instrument: Instrument) -> InstrumentRegistry {
        let registry = InstrumentRegistry::new();
        registry.replace_all([instrument]);
        registry
    }

    #[test]
    fn unknown_instrument_is_rejected() {
        let registry = InstrumentRegistry::new();
        let err = validate(&base_request(), &registry).unwrap_err();
        assert_eq!(err.kind(), "unknown_instrument");
    }

    #[test]
    fn expired_instrument_is_rejected() {
        let mut instrument = Instrument::option(
            1,
            "NIFTY25JAN26000CE",
            InstrumentKind::CallOption,
            "NIFTY",
            dec!(26000),
            chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            75,
            ExchangeSegment::NseFutOpt,
            dec!(0.05),
        );
        instrument.status = InstrumentStatus::Expired;
        let registry = registry_with(instrument);
        let err = validate(&base_request(), &registry).unwrap_err();
        assert_eq!(err.kind(), "expired_instrument");
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let instrument =
            Instrument::spot(1, "RELIANCE", InstrumentKind::Equity, ExchangeSegment::NseEquity, dec!(0.05));
        let registry = registry_with(instrument);
        let mut request = base_request();
        request.quantity = 0;
        let err = validate(&request, &registry).unwrap_err();
        assert_eq!(err.kind(), "non_positive_quantity");
    }

    #[test]
    fn limit_order_without_price_is_rejected() {
        let instrument =
            Instrument::spot(1, "RELIANCE", InstrumentKind::Equity, ExchangeSegment::NseEquity, dec!(0.05));
        let registry = registry_with(instrument);
        let mut request = base_request();
        request.price = None;
        let err = validate(&request, &registry).unwrap_err();
        assert_eq!(err.kind(), "missing_price");
    }

    #[test]
    fn market_order_without_price_is_allowed() {
        let instrument =
            Instrument::spot(1, "RELIANCE", InstrumentKind::Equity, ExchangeSegment::NseEquity, dec!(0.05));
        let registry = registry_with(instrument);
        let mut request = base_request();
        request.price = None;
        request.variety = Variety::Market;
        request.quantity = 1;
        assert!(validate(&request, &registry).is_ok());
    }

    #[test]
    fn quantity_not_a_lot_multiple_is_rejected() {
        let instrument = Instrument::option(
            1,
            "NIFTY25JAN26000CE",
            InstrumentKind::CallOption,
            "NIFTY",
            dec!(26000),
            chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            75,
            ExchangeSegment::NseFutOpt,
            dec!(0.05),
        );
        let registry = registry_with(instrument);
        let mut request = base_request();
        request.instrument_token = 1;
        request.quantity = 10;
        let err = validate(&request, &registry).unwrap_err();
        assert_eq!(err.kind(), "not_a_lot_multiple");
    }

    #[test]
    fn valid_request_passes() {
        let instrument =
            Instrument::spot(1, "RELIANCE", InstrumentKind::Equity, ExchangeSegment::NseEquity, dec!(0.05));
        let registry = registry_with(instrument);
        assert!(validate(&base_request(), &registry).is_ok());
    }
}

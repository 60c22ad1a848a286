//! Subscriber interest consolidation (§4.4 step 1: "desired[token] =
//! max(subscriber.mode) over non-expired tokens"). The Subscription
//! Reconciler itself takes the already-reduced `desired` map as input;
//! this is the piece that builds it from individual consumer interests
//! and filters out tokens the registry has marked expired.

use std::collections::{BTreeMap, HashMap};

use tickgate_markets::registry::Snapshot;
use tickgate_markets::{ConsumerId, InstrumentStatus, Subscription, SubscriptionMode, Token};

/// Tracks every live consumer's interest in every token it has
/// subscribed to, keyed by `token` (mirroring how the Reconciler itself
/// is keyed), and reduces that down to the `token -> mode` map
/// `Supervisor::reconcile` passes on.
#[derive(Debug, Default)]
pub struct InterestBook {
    subscriptions: HashMap<Token, Subscription>,
    modes_by_holder: HashMap<Token, BTreeMap<ConsumerId, SubscriptionMode>>,
}

impl InterestBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `consumer` wants `token` at `mode`; the token's
    /// effective mode becomes `max` over every holder's requested mode
    /// (`Subscription::add_holder`'s invariant).
    pub fn subscribe(&mut self, consumer: ConsumerId, token: Token, mode: SubscriptionMode) {
        let subscription = self.subscriptions.entry(token).or_insert_with(|| Subscription::new(token));
        let modes = self.modes_by_holder.entry(token).or_default();
        subscription.add_holder(consumer, mode, modes);
    }

    /// Remove `consumer`'s interest in `token`. Drops the row entirely
    /// once it has no remaining holders.
    pub fn unsubscribe(&mut self, consumer: &ConsumerId, token: Token) {
        let Some(subscription) = self.subscriptions.get_mut(&token) else { return };
        subscription.holders.remove(consumer);
        if let Some(modes) = self.modes_by_holder.get_mut(&token) {
            modes.remove(consumer);
            subscription.mode = modes.values().copied().max().unwrap_or(SubscriptionMode::Ltp);
        }
        if subscription.is_orphaned() {
            self.subscriptions.remove(&token);
            self.modes_by_holder.remove(&token);
        }
    }

    /// Drop every holder's interest in one sweep, e.g. when a consumer
    /// connection closes.
    pub fn drop_consumer(&mut self, consumer: &ConsumerId) {
        let tokens: Vec<Token> = self.subscriptions.keys().copied().collect();
        for token in tokens {
            self.unsubscribe(consumer, token);
        }
    }

    /// Reduce to the consolidated `token -> mode` map, dropping any token
    /// whose instrument isn't `Active` in `registry` right now (§4.4 step
    /// 1's "non-expired tokens" — an instrument the registry has marked
    /// `Expired` stops being subscription candidacy even if a holder
    /// still lists it).
    pub fn desired(&self, registry: &Snapshot) -> BTreeMap<Token, SubscriptionMode> {
        self.subscriptions
            .iter()
            .filter(|(token, _)| {
                registry
                    .get(token)
                    .map(|instrument| instrument.status == InstrumentStatus::Active)
                    .unwrap_or(false)
            })
            .map(|(token, subscription)| (*token, subscription.mode))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickgate_markets::instrument::{ExchangeSegment, Instrument, InstrumentKind};
    use tickgate_markets::InstrumentRegistry;

    fn registry_with_active(token: Token) -> InstrumentRegistry {
        let registry = InstrumentRegistry::new();
        registry.replace_all([Instrument::spot(token, "RELIANCE", InstrumentKind::Equity, ExchangeSegment::NseEquity, dec!(0.05))]);
        registry
    }

    #[test]
    fn effective_mode_is_max_over_holders() {
        let mut book = InterestBook::new();
        book.subscribe("a".to_string(), 1, SubscriptionMode::Ltp);
        book.subscribe("b".to_string(), 1, SubscriptionMode::Full);

        let registry = registry_with_active(1);
        let desired = book.desired(&registry.snapshot());
        assert_eq!(desired.get(&1), Some(&SubscriptionMode::Full));
    }

    #[test]
    fn last_holder_leaving_drops_the_token() {
        let mut book = InterestBook::new();
        book.subscribe("a".to_string(), 1, SubscriptionMode::Ltp);
        book.unsubscribe(&"a".to_string(), 1);

        let registry = registry_with_active(1);
        assert!(book.desired(&registry.snapshot()).is_empty());
    }

    #[test]
    fn mode_drops_back_down_when_the_highest_holder_leaves() {
        let mut book = InterestBook::new();
        book.subscribe("a".to_string(), 1, SubscriptionMode::Ltp);
        book.subscribe("b".to_string(), 1, SubscriptionMode::Full);
        book.unsubscribe(&"b".to_string(), 1);

        let registry = registry_with_active(1);
        let desired = book.desired(&registry.snapshot());
        assert_eq!(desired.get(&1), Some(&SubscriptionMode::Ltp));
    }

    #[test]
    fn expired_instrument_is_excluded_even_with_a_live_holder() {
        let mut book = InterestBook::new();
        book.subscribe("a".to_string(), 1, SubscriptionMode::Ltp);

        let registry = InstrumentRegistry::new();
        assert!(book.desired(&registry.snapshot()).is_empty());
    }
}

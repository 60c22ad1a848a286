//! Subscription data model (spec §3 "Subscription").
//!
//! Invariants enforced by construction/methods here; the *assignment* of
//! a subscription to one account and the *diffing* against upstream state
//! is the Subscription Reconciler's job (crate `tickgate-data`), not this
//! crate's.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::instrument::Token;

/// Consumer identifier (a downstream WebSocket connection, or an internal
/// strategy/monitor).
pub type ConsumerId = String;

/// Upstream data tier. Ordered `Ltp < Quote < Full` per spec §3/§4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub enum SubscriptionMode {
    Ltp,
    Quote,
    Full,
}

/// One `(account, token)` subscription row. Invariant (a): at most one
/// such row exists per account — enforced by the Reconciler's per-account
/// map being keyed by `token`, not by this type holding account context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub instrument_token: Token,
    pub mode: SubscriptionMode,
    pub holders: BTreeSet<ConsumerId>,
}

impl Subscription {
    pub fn new(instrument_token: Token) -> Self {
        Self {
            instrument_token,
            mode: SubscriptionMode::Ltp,
            holders: BTreeSet::new(),
        }
    }

    /// Add a holder at the given mode and recompute the effective mode as
    /// `max(holder.mode)` (invariant b).
    pub fn add_holder(&mut self, consumer: ConsumerId, mode: SubscriptionMode, modes: &mut std::collections::BTreeMap<ConsumerId, SubscriptionMode>) {
        modes.insert(consumer.clone(), mode);
        self.holders.insert(consumer);
        self.mode = modes
            .values()
            .copied()
            .max()
            .unwrap_or(SubscriptionMode::Ltp);
    }

    /// Invariant (d): callers remove the row entirely once `holders` is
    /// empty; this just reports whether that condition holds.
    pub fn is_orphaned(&self) -> bool {
        self.holders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_ordering() {
        assert!(SubscriptionMode::Ltp < SubscriptionMode::Quote);
        assert!(SubscriptionMode::Quote < SubscriptionMode::Full);
    }

    #[test]
    fn orphaned_when_no_holders() {
        let sub = Subscription::new(1);
        assert!(sub.is_orphaned());
    }
}

//! Read-mostly instrument registry with copy-on-write snapshots.
//!
//! Per spec §5 "Shared resources": updated under a single writer lock;
//! readers see a consistent snapshot. Readers take an `Arc` clone under a
//! brief read lock and then read the snapshot lock-free; the daily
//! refresh (or a runtime addition) builds a new map and swaps it in
//! under a write lock, so no reader ever observes a partially-applied
//! refresh.

use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::instrument::{Instrument, InstrumentStatus, Token};

/// A point-in-time, immutable view of the instrument registry.
pub type Snapshot = Arc<HashMap<Token, Instrument>>;

/// Read-mostly instrument registry (spec §3 "Instrument" lifecycle).
#[derive(Debug)]
pub struct InstrumentRegistry {
    inner: RwLock<Snapshot>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Take a consistent snapshot. Cheap: one `Arc` clone under a read
    /// lock held for the duration of the clone only.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.inner.read())
    }

    /// Replace the whole registry, e.g. from the daily refreshed
    /// registry load. Existing snapshots held by readers remain valid
    /// (they keep the old `Arc` alive).
    pub fn replace_all(&self, instruments: impl IntoIterator<Item = Instrument>) {
        let map = instruments.into_iter().map(|i| (i.token, i)).collect();
        *self.inner.write() = Arc::new(map);
    }

    /// Add or update a single instrument at runtime (spec §3: "additions
    /// permitted at runtime").
    pub fn upsert(&self, instrument: Instrument) {
        let mut guard = self.inner.write();
        let mut map = HashMap::clone(&guard);
        map.insert(instrument.token, instrument);
        *guard = Arc::new(map);
    }

    /// Mark every instrument with `expiry < today` as expired in place.
    /// Spec §3: "removed from subscription candidacy within one refresh
    /// cycle" — the Subscription Reconciler treats `Expired` status as
    /// disqualifying, so marking here is sufficient; this registry does
    /// not itself delete the row (history is still queryable).
    ///
    /// Returns the number of instruments newly marked expired.
    pub fn mark_expired(&self, today: NaiveDate) -> usize {
        let mut guard = self.inner.write();
        let mut map = HashMap::clone(&guard);
        let mut newly_expired = 0;
        for instrument in map.values_mut() {
            if instrument.status == InstrumentStatus::Active && instrument.is_expired_as_of(today) {
                instrument.status = InstrumentStatus::Expired;
                newly_expired += 1;
            }
        }
        if newly_expired > 0 {
            *guard = Arc::new(map);
        }
        newly_expired
    }

    pub fn get(&self, token: Token) -> Option<Instrument> {
        self.inner.read().get(&token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{ExchangeSegment, InstrumentKind};
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_is_stable_across_a_concurrent_replace() {
        let registry = InstrumentRegistry::new();
        registry.replace_all([Instrument::spot(
            1,
            "RELIANCE",
            InstrumentKind::Equity,
            ExchangeSegment::NseEquity,
            dec!(0.05),
        )]);

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);

        registry.replace_all([]);
        // the snapshot taken earlier is untouched
        assert_eq!(snap.len(), 1);
        assert_eq!(registry.snapshot().len(), 0);
    }

    #[test]
    fn mark_expired_flags_past_expiry_options() {
        let registry = InstrumentRegistry::new();
        registry.replace_all([Instrument::option(
            1,
            "NIFTY25JAN26000CE",
            InstrumentKind::CallOption,
            "NIFTY",
            dec!(26000),
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            75,
            ExchangeSegment::NseFutOpt,
            dec!(0.05),
        )]);

        let count = registry.mark_expired(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(count, 1);
        assert_eq!(
            registry.get(1).unwrap().status,
            InstrumentStatus::Expired
        );
    }
}

//! Subscription Reconciler (§4.4): diffs "what consumers want" against
//! "what each account currently has subscribed upstream" and assigns
//! tokens to accounts within a per-account limit, evicting the
//! least-recently-ticked token when every LIVE account is saturated.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tickgate_markets::{AccountId, SubscriptionMode, Token};
use tracing::warn;

/// §6.6 `reconciler.min_interval_ms` / `reconciler.per_account_max_tokens`.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    pub min_interval: Duration,
    pub per_account_max_tokens: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(500),
            per_account_max_tokens: 3000,
        }
    }
}

/// One account in priority order, lower value served first (§3 `Account.priority`).
#[derive(Debug, Clone)]
pub struct AccountSlot {
    pub id: AccountId,
    pub priority: i32,
    pub is_live: bool,
}

/// Per-account additions/removals/mode changes to RPC to the Session
/// Orchestrator (§4.4 step 4), capped at 500 tokens per call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    pub to_add: BTreeMap<Token, SubscriptionMode>,
    pub to_remove: Vec<Token>,
    pub to_upgrade: BTreeMap<Token, SubscriptionMode>,
    pub to_downgrade: BTreeMap<Token, SubscriptionMode>,
}

impl ReconcileDiff {
    fn is_empty(&self) -> bool {
        self.to_add.is_empty()
            && self.to_remove.is_empty()
            && self.to_upgrade.is_empty()
            && self.to_downgrade.is_empty()
    }
}

pub const MAX_BATCH_SIZE: usize = 500;

/// Owns the authoritative `account_id -> (token -> mode)` assignment and
/// produces per-account diffs on each reconcile pass.
#[derive(Debug)]
pub struct SubscriptionReconciler {
    config: ReconcilerConfig,
    current: HashMap<AccountId, BTreeMap<Token, SubscriptionMode>>,
    assigned_to: HashMap<Token, AccountId>,
    last_ticked_monotonic: HashMap<Token, i64>,
}

impl Default for SubscriptionReconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

impl SubscriptionReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            current: HashMap::new(),
            assigned_to: HashMap::new(),
            last_ticked_monotonic: HashMap::new(),
        }
    }

    /// Record that a token ticked at the given monotonic reading, used
    /// to pick an eviction candidate when every LIVE account is
    /// saturated (§4.4 step 2: "evict the least-recently-ticked token").
    pub fn note_tick(&mut self, token: Token, monotonic_now: i64) {
        self.last_ticked_monotonic.insert(token, monotonic_now);
    }

    /// Run one reconcile pass (§4.4 algorithm). `desired` is
    /// `token -> max(holder.mode)` over non-expired tokens, already
    /// computed by the caller from subscriber interests. `accounts` is
    /// the live roster; only `is_live` accounts receive new assignments,
    /// but existing assignments to a now-non-live account are torn down.
    pub fn reconcile(
        &mut self,
        desired: &BTreeMap<Token, SubscriptionMode>,
        accounts: &[AccountSlot],
    ) -> HashMap<AccountId, ReconcileDiff> {
        let mut ordered_live: Vec<&AccountSlot> = accounts.iter().filter(|a| a.is_live).collect();
        ordered_live.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        let live_ids: std::collections::HashSet<&AccountId> =
            ordered_live.iter().map(|a| &a.id).collect();

        // Drop assignments to accounts that are no longer in the roster
        // or no longer LIVE so their tokens become reassignable below.
        self.assigned_to
            .retain(|_, account| accounts.iter().any(|a| &a.id == account));
        let stale: Vec<Token> = self
            .assigned_to
            .iter()
            .filter(|(_, account)| !live_ids.contains(account))
            .map(|(token, _)| *token)
            .collect();
        for token in stale {
            self.assigned_to.remove(&token);
        }

        for token in desired.keys() {
            if self.assigned_to.contains_key(token) {
                continue;
            }
            self.assign(*token, &ordered_live);
        }

        // Anything assigned but no longer desired gets unassigned.
        let to_unassign: Vec<Token> = self
            .assigned_to
            .keys()
            .filter(|t| !desired.contains_key(t))
            .copied()
            .collect();
        for token in to_unassign {
            self.assigned_to.remove(&token);
        }

        let mut diffs = HashMap::new();
        for account in accounts {
            let current = self.current.entry(account.id.clone()).or_default();
            let desired_for_account: BTreeMap<Token, SubscriptionMode> = desired
                .iter()
                .filter(|(token, _)| self.assigned_to.get(token) == Some(&account.id))
                .map(|(t, m)| (*t, *m))
                .collect();

            let mut diff = ReconcileDiff::default();
            for (token, mode) in &desired_for_account {
                match current.get(token) {
                    None => {
                        diff.to_add.insert(*token, *mode);
                    }
                    Some(existing) if existing < mode => {
                        diff.to_upgrade.insert(*token, *mode);
                    }
                    Some(existing) if existing > mode => {
                        diff.to_downgrade.insert(*token, *mode);
                    }
                    _ => {}
                }
            }
            for token in current.keys() {
                if !desired_for_account.contains_key(token) {
                    diff.to_remove.push(*token);
                }
            }

            *current = desired_for_account;

            if !diff.is_empty() {
                diffs.insert(account.id.clone(), diff);
            }
        }

        diffs
    }

    fn assign(&mut self, token: Token, ordered_live: &[&AccountSlot]) {
        for account in ordered_live {
            let count = self
                .assigned_to
                .values()
                .filter(|a| *a == &account.id)
                .count();
            if count < self.config.per_account_max_tokens {
                self.assigned_to.insert(token, account.id.clone());
                return;
            }
        }

        // All LIVE accounts saturated: evict the least-recently-ticked
        // token (ties broken by token value for determinism) and take
        // its slot.
        if let Some(account) = ordered_live.first() {
            if let Some(victim) = self.least_recently_ticked_on(&account.id) {
                warn!(evicted_token = victim, account_id = %account.id, "evicting least-recently-ticked token to admit new subscription");
                self.assigned_to.remove(&victim);
                self.assigned_to.insert(token, account.id.clone());
            }
        }
    }

    fn least_recently_ticked_on(&self, account: &AccountId) -> Option<Token> {
        self.assigned_to
            .iter()
            .filter(|(_, a)| *a == account)
            .map(|(token, _)| *token)
            .min_by_key(|token| (self.last_ticked_monotonic.get(token).copied().unwrap_or(i64::MIN), *token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Vec<AccountSlot> {
        vec![
            AccountSlot { id: "A".into(), priority: 1, is_live: true },
            AccountSlot { id: "B".into(), priority: 2, is_live: true },
        ]
    }

    #[test]
    fn assigns_to_highest_priority_live_account() {
        let mut reconciler = SubscriptionReconciler::default();
        let desired = BTreeMap::from([(11111, SubscriptionMode::Ltp)]);
        let diffs = reconciler.reconcile(&desired, &accounts());
        assert!(diffs["A"].to_add.contains_key(&11111));
        assert!(!diffs.contains_key("B"));
    }

    #[test]
    fn reassigns_when_account_leaves_the_roster() {
        let mut reconciler = SubscriptionReconciler::default();
        let desired = BTreeMap::from([(11111, SubscriptionMode::Ltp)]);
        reconciler.reconcile(&desired, &accounts());

        let only_b = vec![AccountSlot { id: "B".into(), priority: 2, is_live: true }];
        let diffs = reconciler.reconcile(&desired, &only_b);
        assert!(diffs["B"].to_add.contains_key(&11111));
    }

    #[test]
    fn mode_upgrade_is_detected() {
        let mut reconciler = SubscriptionReconciler::default();
        let mut desired = BTreeMap::from([(11111, SubscriptionMode::Ltp)]);
        reconciler.reconcile(&desired, &accounts());

        desired.insert(11111, SubscriptionMode::Full);
        let diffs = reconciler.reconcile(&desired, &accounts());
        assert_eq!(diffs["A"].to_upgrade.get(&11111), Some(&SubscriptionMode::Full));
    }

    #[test]
    fn removed_interest_produces_a_removal() {
        let mut reconciler = SubscriptionReconciler::default();
        let desired = BTreeMap::from([(11111, SubscriptionMode::Ltp)]);
        reconciler.reconcile(&desired, &accounts());

        let empty = BTreeMap::new();
        let diffs = reconciler.reconcile(&empty, &accounts());
        assert_eq!(diffs["A"].to_remove, vec![11111]);
    }
}

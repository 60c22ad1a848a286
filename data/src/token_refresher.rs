//! Token Refresher (§4.8): scheduled, preemptive, and on-demand renewal
//! of upstream access tokens, bounded to 4 concurrent refreshes so one
//! slow/broken account never starves the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Semaphore;
use tracing::{error, info};

use tickgate_core::{Clock, GatewayError, GatewayResult};
use tickgate_markets::{AccountId, TokenState, TokenStatus};

/// §6.6 `token.refresh.hour` / `token.refresh.tz` / `token.preemptive_minutes`.
#[derive(Debug, Clone)]
pub struct TokenRefresherConfig {
    pub scheduled_hour: u32,
    pub scheduled_tz: Tz,
    pub preemptive_minutes: i64,
    pub preemptive_scan_interval: Duration,
    pub max_concurrent_refreshes: usize,
}

impl Default for TokenRefresherConfig {
    fn default() -> Self {
        Self {
            scheduled_hour: 7, // 07:00 IST default
            scheduled_tz: chrono_tz::Asia::Kolkata,
            preemptive_minutes: 60,
            preemptive_scan_interval: Duration::from_secs(60),
            max_concurrent_refreshes: 4,
        }
    }
}

/// Produces a new `(access_token, expires_at)` pair for an account, given
/// its persistent credentials. An external collaborator in production
/// (talks to the broker's auth endpoint); this crate only owns the
/// scheduling policy around calling it.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, account_id: &AccountId) -> GatewayResult<(String, DateTime<Utc>)>;
}

/// Refreshes tokens for the live account roster under a bounded
/// semaphore so one account's slow/broken auth endpoint never starves
/// refreshes for the others (§4.8: "runs concurrently with a semaphore
/// of 4").
pub struct TokenRefresher<C: Clock> {
    config: TokenRefresherConfig,
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<C>,
    semaphore: Arc<Semaphore>,
}

impl<C: Clock> TokenRefresher<C> {
    pub fn new(config: TokenRefresherConfig, issuer: Arc<dyn TokenIssuer>, clock: Arc<C>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_refreshes));
        Self { config, issuer, clock, semaphore }
    }

    /// Refresh one account's token, producing the new [`TokenState`] on
    /// success or a `status=invalid` state on failure (§4.8: "leave
    /// previous token in place" — the caller decides whether to keep the
    /// old state or swap in this invalid one; this returns the outcome
    /// either way rather than mutating anything itself).
    pub async fn refresh_one(&self, account_id: &AccountId) -> Result<TokenState, GatewayError> {
        let _permit = self.semaphore.acquire().await.map_err(|_| GatewayError::Fatal("semaphore closed".into()))?;

        match self.issuer.issue(account_id).await {
            Ok((access_token, expires_at)) => {
                info!(account_id = %account_id, "token refreshed");
                Ok(TokenState {
                    access_token: tickgate_markets::account::Credentials::new(access_token),
                    issued_at: self.clock.now_utc(),
                    expires_at,
                    status: TokenStatus::Fresh,
                })
            }
            Err(err) => {
                error!(account_id = %account_id, error = %err, "token refresh failed");
                Err(err)
            }
        }
    }

    /// Preemptive scan policy (§4.8): any account whose token expires
    /// within `preemptive_minutes` is due for refresh.
    pub fn is_due_for_preemptive_refresh(&self, token: &TokenState) -> bool {
        let remaining = token.minutes_until_expiry(self.clock.now_utc());
        remaining < self.config.preemptive_minutes
    }

    /// Scheduled refresh policy (§4.8): true once per day at
    /// `scheduled_hour` in `scheduled_tz`. Callers are expected to call
    /// this from a periodic tick and track "already refreshed today"
    /// themselves to avoid double-firing within the same hour.
    pub fn is_scheduled_refresh_hour(&self) -> bool {
        let local = self.clock.now_utc().with_timezone(&self.config.scheduled_tz);
        use chrono::Timelike;
        local.hour() == self.config.scheduled_hour
    }

    /// How often a periodic scan should call
    /// [`TokenRefresher::is_due_for_preemptive_refresh`]/
    /// [`TokenRefresher::is_scheduled_refresh_hour`] against the account
    /// roster.
    pub fn preemptive_scan_interval(&self) -> Duration {
        self.config.preemptive_scan_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tickgate_core::FakeClock;
    use tickgate_markets::account::Credentials;

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl TokenIssuer for AlwaysSucceeds {
        async fn issue(&self, _account_id: &AccountId) -> GatewayResult<(String, DateTime<Utc>)> {
            Ok(("new-token".to_string(), Utc::now() + ChronoDuration::hours(6)))
        }
    }

    struct AlwaysFails;

    #[async_trait::async_trait]
    impl TokenIssuer for AlwaysFails {
        async fn issue(&self, _account_id: &AccountId) -> GatewayResult<(String, DateTime<Utc>)> {
            Err(GatewayError::Auth("credentials rejected".into()))
        }
    }

    #[tokio::test]
    async fn successful_refresh_yields_fresh_status() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let refresher = TokenRefresher::new(TokenRefresherConfig::default(), Arc::new(AlwaysSucceeds), clock);
        let state = refresher.refresh_one(&"A".to_string()).await.unwrap();
        assert_eq!(state.status, TokenStatus::Fresh);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_the_error() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let refresher = TokenRefresher::new(TokenRefresherConfig::default(), Arc::new(AlwaysFails), clock);
        assert!(refresher.refresh_one(&"A".to_string()).await.is_err());
    }

    #[test]
    fn preemptive_window_flags_soon_to_expire_tokens() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let refresher = TokenRefresher::new(TokenRefresherConfig::default(), Arc::new(AlwaysSucceeds), clock.clone());
        let soon = TokenState {
            access_token: Credentials::new("t".to_string()),
            issued_at: clock.now_utc(),
            expires_at: clock.now_utc() + ChronoDuration::minutes(30),
            status: TokenStatus::Fresh,
        };
        assert!(refresher.is_due_for_preemptive_refresh(&soon));

        let far = TokenState {
            expires_at: clock.now_utc() + ChronoDuration::hours(5),
            ..soon
        };
        assert!(!refresher.is_due_for_preemptive_refresh(&far));
    }
}

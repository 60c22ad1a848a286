//! Health *data* shape (§6.4 `GET /health`): `{status, components}`. This
//! module only computes the shape from inputs the [`Supervisor`](crate::supervisor::Supervisor)
//! already tracks; serving it over HTTP is an external concern (§1
//! Non-goals — "HTTP route handlers" are not this crate's job).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use tickgate_data::orchestrator::SessionState;
use tickgate_markets::AccountMode;

/// Overall gateway health (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Critical,
}

/// Serializable mirror of [`SessionState`]; kept separate rather than
/// deriving `Serialize` on the orchestrator's own enum so this crate's
/// wire shape can evolve independently of that state machine's variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStateLabel {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    RetryBackoff,
    InvalidToken,
    Off,
}

impl From<SessionState> for SessionStateLabel {
    fn from(value: SessionState) -> Self {
        match value {
            SessionState::Disconnected => Self::Disconnected,
            SessionState::Connecting => Self::Connecting,
            SessionState::Authenticating => Self::Authenticating,
            SessionState::Subscribed => Self::Subscribed,
            SessionState::RetryBackoff => Self::RetryBackoff,
            SessionState::InvalidToken => Self::InvalidToken,
            SessionState::Off => Self::Off,
        }
    }
}

/// One account's contribution to the health report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AccountHealth {
    pub mode: AccountModeLabel,
    pub session_state: SessionStateLabel,
}

/// Serializable mirror of `tickgate_markets::AccountMode`, for the same
/// reason as [`SessionStateLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountModeLabel {
    Live,
    Mock,
    Off,
}

impl From<AccountMode> for AccountModeLabel {
    fn from(value: AccountMode) -> Self {
        match value {
            AccountMode::Live => Self::Live,
            AccountMode::Mock => Self::Mock,
            AccountMode::Off => Self::Off,
        }
    }
}

/// Full health report (§6.4): one entry per account under `components`,
/// plus the rolled-up `status`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, AccountHealth>,
}

/// How long the Tick Bus has gone without publishing anything, as
/// observed by the caller (the [`Supervisor`](crate::supervisor::Supervisor)
/// samples `TickBus::published_count` on an interval and tracks how long
/// that counter has stood still).
#[derive(Debug, Clone, Copy)]
pub struct UpstreamLiveness {
    pub silent_for: Duration,
    pub market_is_open: bool,
}

const UPSTREAM_SILENCE_CRITICAL: Duration = Duration::from_secs(60);

/// Computes the §6.4 report from per-account state plus upstream
/// liveness. Pure function: no I/O, no locking, so it's trivially unit
/// tested against every boundary the spec names.
pub fn compute_health(
    accounts: &BTreeMap<String, AccountHealth>,
    upstream: UpstreamLiveness,
) -> HealthReport {
    let any_live_subscribed = accounts
        .values()
        .any(|a| a.mode == AccountModeLabel::Live && a.session_state == SessionStateLabel::Subscribed);
    let any_retry_backoff = accounts
        .values()
        .any(|a| a.session_state == SessionStateLabel::RetryBackoff);
    let upstream_silent = upstream.market_is_open && upstream.silent_for >= UPSTREAM_SILENCE_CRITICAL;

    let status = if !any_live_subscribed || upstream_silent {
        HealthStatus::Critical
    } else if any_retry_backoff {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };

    HealthReport { status, components: accounts.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(mode: AccountModeLabel, state: SessionStateLabel) -> AccountHealth {
        AccountHealth { mode, session_state: state }
    }

    fn no_silence() -> UpstreamLiveness {
        UpstreamLiveness { silent_for: Duration::ZERO, market_is_open: true }
    }

    #[test]
    fn all_subscribed_is_ok() {
        let accounts = BTreeMap::from([
            ("primary".to_string(), account(AccountModeLabel::Live, SessionStateLabel::Subscribed)),
        ]);
        let report = compute_health(&accounts, no_silence());
        assert_eq!(report.status, HealthStatus::Ok);
    }

    #[test]
    fn one_account_in_retry_backoff_is_degraded() {
        let accounts = BTreeMap::from([
            ("primary".to_string(), account(AccountModeLabel::Live, SessionStateLabel::Subscribed)),
            ("backup".to_string(), account(AccountModeLabel::Live, SessionStateLabel::RetryBackoff)),
        ]);
        let report = compute_health(&accounts, no_silence());
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn no_live_subscribed_accounts_is_critical() {
        let accounts = BTreeMap::from([
            ("primary".to_string(), account(AccountModeLabel::Mock, SessionStateLabel::Off)),
        ]);
        let report = compute_health(&accounts, no_silence());
        assert_eq!(report.status, HealthStatus::Critical);
    }

    #[test]
    fn silent_upstream_during_market_hours_is_critical_even_if_subscribed() {
        let accounts = BTreeMap::from([
            ("primary".to_string(), account(AccountModeLabel::Live, SessionStateLabel::Subscribed)),
        ]);
        let upstream = UpstreamLiveness { silent_for: Duration::from_secs(61), market_is_open: true };
        let report = compute_health(&accounts, upstream);
        assert_eq!(report.status, HealthStatus::Critical);
    }

    #[test]
    fn silent_upstream_outside_market_hours_is_not_penalized() {
        let accounts = BTreeMap::from([
            ("primary".to_string(), account(AccountModeLabel::Live, SessionStateLabel::Subscribed)),
        ]);
        let upstream = UpstreamLiveness { silent_for: Duration::from_secs(600), market_is_open: false };
        let report = compute_health(&accounts, upstream);
        assert_eq!(report.status, HealthStatus::Ok);
    }
}

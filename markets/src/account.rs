//! Account data model (spec §3 "Account").
//!
//! `credentials` is never logged: [`Credentials`] implements `Debug` and
//! `Display` itself redact the secret payload.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable account identifier, e.g. `"primary"`.
pub type AccountId = String;

/// Per-account runtime mode policy outcome (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Mode {
    #[display("LIVE")]
    Live,
    #[display("MOCK")]
    Mock,
    #[display("OFF")]
    Off,
}

/// Freshness of the account's upstream access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum TokenStatus {
    Fresh,
    Refreshing,
    Invalid,
}

/// Opaque credential payload. `Debug`/`Display` never print the contents.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the raw secret. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Current state of an account's upstream access token (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: Credentials,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: TokenStatus,
}

impl TokenState {
    pub fn invalid() -> Self {
        Self {
            access_token: Credentials::new(""),
            issued_at: DateTime::<Utc>::UNIX_EPOCH,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
            status: TokenStatus::Invalid,
        }
    }

    /// Minutes remaining until expiry, used by the Token Refresher's
    /// preemptive scan (spec §4.8: refresh when `< 60 min` remain).
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_minutes()
    }
}

/// A broker trading account (spec §3 "Account").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub broker: String,
    pub credentials: Credentials,
    pub current_mode: Mode,
    pub token_state: TokenState,
    /// Lower value served first in failover / reconciler assignment.
    pub priority: u32,
}

impl Account {
    pub fn new(id: impl Into<String>, broker: impl Into<String>, credentials: Credentials, priority: u32) -> Self {
        Self {
            id: id.into(),
            broker: broker.into(),
            credentials,
            current_mode: Mode::Off,
            token_state: TokenState::invalid(),
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("super-secret-token");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret-token"));
    }

    #[test]
    fn minutes_until_expiry_is_signed() {
        let now = Utc::now();
        let state = TokenState {
            access_token: Credentials::new("x"),
            issued_at: now,
            expires_at: now + chrono::Duration::minutes(45),
            status: TokenStatus::Fresh,
        };
        assert_eq!(state.minutes_until_expiry(now), 45);
    }
}

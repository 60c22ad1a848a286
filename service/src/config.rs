//! Typed configuration shape (§6.6): every recognized key, with defaults
//! matching the component-level defaults already established across the
//! workspace. This crate owns the *shape*; how the bytes backing it get
//! loaded (a file, an env layer, a remote config service) is an external
//! concern per §1 Non-goals, so [`Config`] only implements [`Deserialize`]
//! and is expected to arrive fully formed from whatever the deployment's
//! loader produces (`config`/`figment`-style crates, or a bare
//! `serde_json::from_str`, are equally valid callers).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use tickgate_core::circuit_breaker::CircuitBreakerConfig;
use tickgate_data::mode_manager::ModePolicy;
use tickgate_data::reconciler::ReconcilerConfig;
use tickgate_data::token_refresher::TokenRefresherConfig;
use tickgate_risk::AttemptPolicy;

/// `accounts.<id>.mode` (§6.6). `serde`'s `rename_all` keeps the wire
/// spelling lowercase while the Rust-side type matches
/// [`tickgate_data::mode_manager::ModePolicy`]'s variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfiguredMode {
    Auto,
    ForceMock,
    ForceLive,
    Off,
}

impl From<ConfiguredMode> for ModePolicy {
    fn from(value: ConfiguredMode) -> Self {
        match value {
            ConfiguredMode::Auto => ModePolicy::Auto,
            ConfiguredMode::ForceMock => ModePolicy::ForceMock,
            ConfiguredMode::ForceLive => ModePolicy::ForceLive,
            ConfiguredMode::Off => ModePolicy::Off,
        }
    }
}

/// One entry of `accounts.*` (§6.6): which broker, which calendar, and
/// which mode policy this account runs under.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub broker: String,
    pub mode: ConfiguredMode,
    #[serde(default = "default_calendar_code")]
    pub calendar: String,
    /// Lower value served first in failover / reconciler assignment
    /// (§3 `Account.priority`).
    #[serde(default)]
    pub priority: u32,
    /// Ordered failover chain for orders submitted against this account
    /// (§3 `OrderRequest.failover_accounts`), configured once here rather
    /// than required on every request.
    #[serde(default)]
    pub failover_accounts: Vec<String>,
}

fn default_calendar_code() -> String {
    "NSE".to_string()
}

/// `calendar.code` (§6.6): the default calendar an account falls back to
/// when its own entry doesn't override it.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_code")]
    pub code: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self { code: default_calendar_code() }
    }
}

/// `bus.subscriber_queue` (§6.6, default from §5 "Resource bounds").
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

fn default_subscriber_queue() -> usize {
    tickgate_data::bus::DEFAULT_SUBSCRIBER_QUEUE
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { subscriber_queue: default_subscriber_queue() }
    }
}

/// `greeks.risk_free_rate` / `greeks.cache_size` (§6.6).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GreeksSettings {
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_greeks_cache_size")]
    pub cache_size: usize,
}

fn default_risk_free_rate() -> f64 {
    0.065
}

fn default_greeks_cache_size() -> usize {
    50_000
}

impl Default for GreeksSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            cache_size: default_greeks_cache_size(),
        }
    }
}

impl From<GreeksSettings> for tickgate_data::GreeksConfig {
    fn from(value: GreeksSettings) -> Self {
        Self {
            risk_free_rate: value.risk_free_rate,
            cache_size: value.cache_size,
            ..Default::default()
        }
    }
}

/// `reconciler.min_interval_ms` / `reconciler.per_account_max_tokens` (§6.6).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconcilerSettings {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_per_account_max_tokens")]
    pub per_account_max_tokens: usize,
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_per_account_max_tokens() -> usize {
    3000
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            per_account_max_tokens: default_per_account_max_tokens(),
        }
    }
}

impl From<ReconcilerSettings> for ReconcilerConfig {
    fn from(value: ReconcilerSettings) -> Self {
        Self {
            min_interval: Duration::from_millis(value.min_interval_ms),
            per_account_max_tokens: value.per_account_max_tokens,
        }
    }
}

/// `order.retry.*` (§6.6): the default [`AttemptPolicy`] applied to a
/// `placeOrder` request that omits one.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrderRetrySettings {
    #[serde(default = "default_retry_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_retry_cap_ms")]
    pub cap_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_cap_ms() -> u64 {
    30_000
}

fn default_retry_max_attempts() -> u32 {
    5
}

impl Default for OrderRetrySettings {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            cap_ms: default_retry_cap_ms(),
            max_attempts: default_retry_max_attempts(),
        }
    }
}

impl OrderRetrySettings {
    /// `cap_ms` isn't itself a field on [`AttemptPolicy`] (the executor's
    /// backoff cap is a fixed §4.7 constant, not configurable per order);
    /// it's kept here only because §6.6 lists it as a recognized key, and
    /// validated against at config-read time via [`Config::validate`].
    pub fn to_attempt_policy(self) -> AttemptPolicy {
        AttemptPolicy {
            max_attempts: self.max_attempts,
            backoff_base_ms: self.base_ms,
            jitter_cap_ms: self.base_ms,
        }
    }
}

/// `order.circuit.*` (§6.6).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrderCircuitSettings {
    #[serde(default = "default_consecutive_failures")]
    pub consecutive_failures: u32,
    #[serde(default = "default_open_duration_s")]
    pub open_duration_s: u64,
}

fn default_consecutive_failures() -> u32 {
    5
}

fn default_open_duration_s() -> u64 {
    30
}

impl Default for OrderCircuitSettings {
    fn default() -> Self {
        Self {
            consecutive_failures: default_consecutive_failures(),
            open_duration_s: default_open_duration_s(),
        }
    }
}

impl From<OrderCircuitSettings> for CircuitBreakerConfig {
    fn from(value: OrderCircuitSettings) -> Self {
        Self {
            consecutive_failure_threshold: value.consecutive_failures,
            open_duration: Duration::from_secs(value.open_duration_s),
            ..Default::default()
        }
    }
}

/// `order.*` (§6.6): groups `order.retry.*` and `order.circuit.*`.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct OrderConfig {
    #[serde(default)]
    pub retry: OrderRetrySettings,
    #[serde(default)]
    pub circuit: OrderCircuitSettings,
}

/// `token.refresh.hour` / `token.refresh.tz` / `token.preemptive_minutes` (§6.6).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub refresh: TokenRefreshSettings,
    #[serde(default = "default_preemptive_minutes")]
    pub preemptive_minutes: i64,
}

fn default_preemptive_minutes() -> i64 {
    60
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh: TokenRefreshSettings::default(),
            preemptive_minutes: default_preemptive_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshSettings {
    #[serde(default = "default_refresh_hour")]
    pub hour: u32,
    #[serde(default = "default_refresh_tz")]
    pub tz: String,
}

fn default_refresh_hour() -> u32 {
    7
}

fn default_refresh_tz() -> String {
    "Asia/Kolkata".to_string()
}

impl Default for TokenRefreshSettings {
    fn default() -> Self {
        Self {
            hour: default_refresh_hour(),
            tz: default_refresh_tz(),
        }
    }
}

impl TokenConfig {
    /// Builds the concrete refresher config; the timezone string is
    /// parsed here rather than at deserialization time so a bad value
    /// surfaces as a [`ConfigError`] with the offending string attached
    /// instead of an opaque serde error.
    pub fn to_refresher_config(&self) -> Result<TokenRefresherConfig, ConfigError> {
        let scheduled_tz: chrono_tz::Tz = self
            .refresh
            .tz
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.refresh.tz.clone()))?;
        Ok(TokenRefresherConfig {
            scheduled_hour: self.refresh.hour,
            scheduled_tz,
            preemptive_minutes: self.preemptive_minutes,
            ..Default::default()
        })
    }
}

/// Top-level configuration (§6.6's full recognized key list).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub greeks: GreeksSettings,
    #[serde(default)]
    pub reconciler: ReconcilerSettings,
    #[serde(default)]
    pub order: OrderConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

/// Failures specific to interpreting an already-deserialized [`Config`];
/// malformed input itself is a `serde`/loader-crate error, not this one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("accounts map must not be empty")]
    NoAccounts,
    #[error("token.refresh.tz {0:?} is not a recognized IANA timezone")]
    InvalidTimezone(String),
}

impl Config {
    /// Structural checks beyond what `serde` itself enforces (§7
    /// "missing required config" is a `Fatal` condition the process
    /// should refuse to start under, not limp along with).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        self.token.to_refresher_config()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_every_default() {
        let raw = r#"
            [accounts.primary]
            broker = "dhan"
            mode = "auto"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.accounts["primary"].calendar, "NSE");
        assert_eq!(config.bus.subscriber_queue, 1024);
        assert_eq!(config.greeks.cache_size, 50_000);
        assert_eq!(config.order.retry.max_attempts, 5);
        assert_eq!(config.token.refresh.hour, 7);
        config.validate().unwrap();
    }

    #[test]
    fn empty_accounts_map_fails_validation() {
        let raw = "accounts = {}";
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoAccounts)));
    }

    #[test]
    fn unrecognized_timezone_fails_validation() {
        let raw = r#"
            [accounts.primary]
            broker = "dhan"
            mode = "auto"

            [token.refresh]
            tz = "Not/ARealZone"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimezone(_))));
    }
}

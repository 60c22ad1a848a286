//! Per-account `LIVE`/`MOCK`/`OFF` decision (§4.1).
//!
//! The Calendar Client is an external collaborator (§1 Non-goals); this
//! module only defines the trait seam and the policy that consumes it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use parking_lot::Mutex;
use tickgate_markets::AccountMode;

use tickgate_core::Clock;

/// Configured per-account mode policy (§6.6 `accounts.*.mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModePolicy {
    Auto,
    ForceMock,
    ForceLive,
    Off,
}

/// Answers "is market open for calendar X at time T" — an external
/// collaborator (§1). `NSE` regional-hours fallback is the only concrete
/// behavior this crate owns; a real implementation talks to a holiday
/// service.
pub trait CalendarClient: Send + Sync {
    fn is_open(&self, calendar_code: &str, at: DateTime<Utc>) -> Result<bool, ()>;
}

/// Always reports "closed" — used so a calendar outage degrades safely
/// to the time-of-day fallback rather than panicking in tests that don't
/// wire up a real calendar.
#[derive(Debug, Default)]
pub struct UnavailableCalendar;

impl CalendarClient for UnavailableCalendar {
    fn is_open(&self, _calendar_code: &str, _at: DateTime<Utc>) -> Result<bool, ()> {
        Err(())
    }
}

const CALENDAR_CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    value: bool,
    cached_at: Instant,
}

/// Regional trading window fallback used when the calendar is
/// unreachable: IST market hours, Monday–Friday, 09:15–15:30.
fn time_of_day_fallback(at: DateTime<Utc>) -> bool {
    let ist = at + chrono::Duration::minutes(330);
    if matches!(ist.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let minutes_since_midnight = ist.hour() * 60 + ist.minute();
    (9 * 60 + 15..=15 * 60 + 30).contains(&minutes_since_midnight)
}

/// Decides `LIVE`/`MOCK`/`OFF` for one account, caching calendar lookups
/// per calendar code for 60 s (§4.1).
pub struct ModeManager<C: Clock> {
    calendar: Box<dyn CalendarClient>,
    clock: C,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl<C: Clock> ModeManager<C> {
    pub fn new(calendar: Box<dyn CalendarClient>, clock: C) -> Self {
        Self {
            calendar,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate the mode for one account under the given policy and
    /// calendar code. Pure with respect to its inputs modulo the 60 s
    /// calendar cache and the current clock reading.
    pub fn evaluate(&self, policy: ModePolicy, calendar_code: &str) -> AccountMode {
        match policy {
            ModePolicy::ForceMock => AccountMode::Mock,
            ModePolicy::ForceLive => AccountMode::Live,
            ModePolicy::Off => AccountMode::Off,
            ModePolicy::Auto => {
                if self.market_open(calendar_code) {
                    AccountMode::Live
                } else {
                    AccountMode::Mock
                }
            }
        }
    }

    fn market_open(&self, calendar_code: &str) -> bool {
        let now_monotonic = self.clock.now_monotonic();
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.get(calendar_code) {
            if now_monotonic.saturating_duration_since(entry.cached_at) < CALENDAR_CACHE_TTL {
                return entry.value;
            }
        }

        let now_utc = self.clock.now_utc();
        let value = match self.calendar.is_open(calendar_code, now_utc) {
            Ok(open) => open,
            Err(()) => time_of_day_fallback(now_utc),
        };

        cache.insert(
            calendar_code.to_string(),
            CacheEntry {
                value,
                cached_at: now_monotonic,
            },
        );
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickgate_core::FakeClock;

    #[test]
    fn force_mock_is_unconditional() {
        let clock = FakeClock::new(Utc::now());
        let manager = ModeManager::new(Box::new(UnavailableCalendar), clock);
        assert_eq!(manager.evaluate(ModePolicy::ForceMock, "NSE"), AccountMode::Mock);
    }

    #[test]
    fn off_is_unconditional() {
        let clock = FakeClock::new(Utc::now());
        let manager = ModeManager::new(Box::new(UnavailableCalendar), clock);
        assert_eq!(manager.evaluate(ModePolicy::Off, "NSE"), AccountMode::Off);
    }

    #[test]
    fn auto_falls_back_to_time_of_day_on_calendar_outage() {
        // 2024-06-10 is a Monday; 10:00 IST is within market hours.
        let monday_10am_ist = DateTime::parse_from_rfc3339("2024-06-10T04:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FakeClock::new(monday_10am_ist);
        let manager = ModeManager::new(Box::new(UnavailableCalendar), clock);
        assert_eq!(manager.evaluate(ModePolicy::Auto, "NSE"), AccountMode::Live);
    }

    #[test]
    fn auto_is_mock_outside_market_hours() {
        let sunday = DateTime::parse_from_rfc3339("2024-06-09T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FakeClock::new(sunday);
        let manager = ModeManager::new(Box::new(UnavailableCalendar), clock);
        assert_eq!(manager.evaluate(ModePolicy::Auto, "NSE"), AccountMode::Mock);
    }
}

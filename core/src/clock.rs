//! # Clock abstraction
//!
//! Every timing-sensitive component (Mode Manager's 60s calendar cache,
//! Token Refresher's scheduled/preemptive scans, Session Orchestrator's
//! reconnect backoff, Greeks Enricher's minute-boundary cache
//! invalidation) reads time through [`Clock`] rather than calling
//! `Instant::now`/`SystemTime::now` directly, so tests can drive time
//! deterministically instead of sleeping real wall-clock seconds.
//!
//! [`Clock::monotonic_minute`] backs the Greeks cache's invalidation
//! instead of wall-clock minute boundaries — see `DESIGN.md` Open
//! Question 2: an NTP correction that jumps the wall clock must not
//! smear cache entries across a minute they never crossed.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Source of truth for "now", abstracted so components are testable
/// without real sleeps.
pub trait Clock: Send + Sync + 'static {
    /// Wall-clock time, used for anything a human or an external system
    /// will observe (timestamps on ticks, token `expires_at`, log lines).
    fn now_utc(&self) -> DateTime<Utc>;

    /// Monotonic instant, used for intervals that must never run
    /// backwards or jump (backoff timers, cache TTLs, staleness checks).
    fn now_monotonic(&self) -> Instant;

    /// Monotonic time truncated to whole minutes since the clock was
    /// constructed. Used by the Greeks cache key instead of a wall-clock
    /// minute, per Open Question 2.
    fn monotonic_minute(&self) -> i64 {
        self.now_monotonic().elapsed_minutes_since_epoch()
    }
}

/// Helper trait kept private-ish via blanket impl so `Clock` doesn't need
/// to special-case `Instant` arithmetic inline.
trait InstantExt {
    fn elapsed_minutes_since_epoch(&self) -> i64;
}

impl InstantExt for Instant {
    fn elapsed_minutes_since_epoch(&self) -> i64 {
        // Instant has no fixed epoch; we only need values that are
        // monotonically increasing and stable across calls within a
        // process, which Instant's own ordering already guarantees, so a
        // duration-since-process-start proxy is created once and reused.
        PROCESS_START
            .get_or_init(Instant::now)
            .elapsed()
            .as_secs() as i64
            / 60
    }
}

static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Production [`Clock`] backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic fake clock for tests: starts at a fixed instant/UTC time
/// and only advances when [`FakeClock::advance`] is called.
#[derive(Debug)]
pub struct FakeClock {
    epoch_utc: DateTime<Utc>,
    offset_secs: AtomicI64,
    started: Instant,
}

impl FakeClock {
    pub fn new(epoch_utc: DateTime<Utc>) -> Self {
        Self {
            epoch_utc,
            offset_secs: AtomicI64::new(0),
            started: Instant::now(),
        }
    }

    /// Advance both the wall-clock and monotonic views by `secs`.
    pub fn advance(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.epoch_utc + chrono::Duration::seconds(self.offset_secs.load(Ordering::SeqCst))
    }

    fn now_monotonic(&self) -> Instant {
        self.started + std::time::Duration::from_secs(self.offset_secs.load(Ordering::SeqCst).max(0) as u64)
    }

    fn monotonic_minute(&self) -> i64 {
        self.offset_secs.load(Ordering::SeqCst) / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new(Utc::now());
        let t0 = clock.now_utc();
        assert_eq!(clock.monotonic_minute(), 0);
        clock.advance(61);
        assert!(clock.now_utc() > t0);
        assert_eq!(clock.monotonic_minute(), 1);
    }
}

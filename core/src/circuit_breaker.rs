//! # Circuit breaker — shared primitive
//!
//! The closed/open/half-open failure-counting state machine described in
//! spec §4.7 and listed in the system overview as a primitive shared
//! across components. The Order Executor uses one breaker per account to
//! fail fast on a sick broker; the Session Orchestrator reuses the same
//! type to count repeated `INVALID_TOKEN` transitions (≥3 in 10 minutes
//! escalates the account to `OFF`).
//!
//! State is kept behind a `parking_lot::Mutex` rather than an async lock:
//! every operation here is a short in-memory transition with no
//! suspension point, matching the concurrency model's rule that no
//! component holds a lock across an await.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    recent: std::collections::VecDeque<bool>,
    opened_at: Option<Instant>,
}

/// Tunables for a [`CircuitBreaker`]; defaults match spec §4.7.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker from `closed`.
    pub consecutive_failure_threshold: u32,
    /// Window size for the failure-rate trip condition.
    pub window_size: usize,
    /// Failure rate over the window (0.0-1.0) that trips the breaker.
    pub failure_rate_threshold: f64,
    /// How long `open` holds before allowing a `half-open` probe.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 5,
            window_size: 20,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Per-account (or per-resource) circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Outcome of asking the breaker for permission to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed with a normal dispatch.
    Allowed,
    /// Proceed, but this is the single allowed half-open probe.
    Probe,
    /// Reject immediately; do not call upstream.
    Rejected,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                recent: std::collections::VecDeque::with_capacity(config.window_size),
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask whether a new task may be dispatched right now. Must be called
    /// immediately before dispatch so the `open -> half-open` transition
    /// (time-based) is evaluated freshly each time.
    pub fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => Admission::Rejected, // probe already in flight
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Record a dispatch outcome and transition state accordingly.
    pub fn record(&self, success: bool) {
        let mut inner = self.inner.lock();

        if inner.recent.len() == self.config.window_size {
            inner.recent.pop_front();
        }
        inner.recent.push_back(success);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = if success {
                    inner.consecutive_failures = 0;
                    inner.recent.clear();
                    CircuitState::Closed
                } else {
                    inner.opened_at = Some(Instant::now());
                    CircuitState::Open
                };
            }
            CircuitState::Closed | CircuitState::Open => {
                if success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                }

                let failures_in_window = inner.recent.iter().filter(|ok| !**ok).count();
                let rate = failures_in_window as f64 / inner.recent.len().max(1) as f64;

                let should_open = inner.consecutive_failures
                    >= self.config.consecutive_failure_threshold
                    || (inner.recent.len() == self.config.window_size
                        && rate > self.config.failure_rate_threshold);

                if should_open && inner.state == CircuitState::Closed {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        for _ in 0..5 {
            assert_eq!(cb.admit(), Admission::Allowed);
            cb.record(false);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.admit(), Admission::Rejected);
    }

    #[test]
    fn half_open_probe_then_close_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            open_duration: Duration::from_millis(0),
            ..Default::default()
        });
        for _ in 0..5 {
            cb.admit();
            cb.record(false);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.admit(), Admission::Probe);
        cb.record(true);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.admit(), Admission::Allowed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            open_duration: Duration::from_millis(0),
            ..Default::default()
        });
        for _ in 0..5 {
            cb.admit();
            cb.record(false);
        }
        assert_eq!(cb.admit(), Admission::Probe);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}

//! Greeks Enricher (§4.3): implied volatility + first-order Greeks for
//! option ticks, computed on a small pinned-by-token worker pool so
//! per-token order is preserved through the CPU-bound root-find.
//!
//! The Black–Scholes pricer itself is an external subroutine per §1; the
//! [`OptionPricer`] trait is the seam a real implementation plugs into.
//! `BlackScholesPricer` here is a reference implementation so the crate
//! is runnable standalone, not a stand-in for an external service.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use lru::LruCache;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};

use tickgate_core::Clock;

use crate::tick::{Greeks, Tick};

/// Risk-free rate and cache size are configuration (§6.6
/// `greeks.risk_free_rate`, `greeks.cache_size`); the IV search bounds
/// and tolerance are fixed by §4.3 and not configurable.
#[derive(Debug, Clone, Copy)]
pub struct GreeksConfig {
    pub risk_free_rate: f64,
    pub cache_size: usize,
    pub max_spot_age: std::time::Duration,
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.065,
            cache_size: 50_000,
            max_spot_age: std::time::Duration::from_secs(5),
        }
    }
}

const IV_LOWER: f64 = 0.01;
const IV_UPPER: f64 = 5.0;
const IV_TOLERANCE: f64 = 1e-4;
const IV_MAX_ITERATIONS: u32 = 60;

/// Seam for the Black–Scholes subroutine (§1 Non-goals: "the
/// Black–Scholes formula itself"). `implied_volatility` performs the
/// bisection root-find in terms of a price function this trait supplies.
pub trait OptionPricer: Send + Sync {
    /// Theoretical price of an option at the given volatility.
    fn price(&self, is_call: bool, spot: f64, strike: f64, years_to_expiry: f64, rate: f64, vol: f64) -> f64;

    /// First-order Greeks at the given volatility.
    fn greeks(&self, is_call: bool, spot: f64, strike: f64, years_to_expiry: f64, rate: f64, vol: f64) -> (f64, f64, f64, f64);
}

/// Standard Black–Scholes pricer with the usual closed-form Greeks.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlackScholesPricer;

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz & Stegun 7.1.26 approximation; error < 1.5e-7, well inside
/// the IV root-find's own 1e-4 tolerance.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

fn d1_d2(spot: f64, strike: f64, years: f64, rate: f64, vol: f64) -> (f64, f64) {
    let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * years) / (vol * years.sqrt());
    let d2 = d1 - vol * years.sqrt();
    (d1, d2)
}

impl OptionPricer for BlackScholesPricer {
    fn price(&self, is_call: bool, spot: f64, strike: f64, years: f64, rate: f64, vol: f64) -> f64 {
        let (d1, d2) = d1_d2(spot, strike, years, rate, vol);
        if is_call {
            spot * norm_cdf(d1) - strike * (-rate * years).exp() * norm_cdf(d2)
        } else {
            strike * (-rate * years).exp() * norm_cdf(-d2) - spot * norm_cdf(-d1)
        }
    }

    fn greeks(&self, is_call: bool, spot: f64, strike: f64, years: f64, rate: f64, vol: f64) -> (f64, f64, f64, f64) {
        let (d1, d2) = d1_d2(spot, strike, years, rate, vol);
        let delta = if is_call { norm_cdf(d1) } else { norm_cdf(d1) - 1.0 };
        let gamma = norm_pdf(d1) / (spot * vol * years.sqrt());
        let vega = spot * norm_pdf(d1) * years.sqrt() / 100.0;
        let theta = if is_call {
            (-spot * norm_pdf(d1) * vol / (2.0 * years.sqrt())
                - rate * strike * (-rate * years).exp() * norm_cdf(d2))
                / 365.0
        } else {
            (-spot * norm_pdf(d1) * vol / (2.0 * years.sqrt())
                + rate * strike * (-rate * years).exp() * norm_cdf(-d2))
                / 365.0
        };
        (delta, gamma, theta, vega)
    }
}

/// Bisection root-find on volatility in `[0.01, 5.0]`, tolerance `1e-4`,
/// capped at 60 iterations (§4.3). Returns `None` on non-convergence —
/// the caller emits the tick with null Greeks fields, never an error.
fn implied_volatility(pricer: &dyn OptionPricer, is_call: bool, spot: f64, strike: f64, years: f64, rate: f64, target_price: f64) -> Option<f64> {
    let mut lo = IV_LOWER;
    let mut hi = IV_UPPER;
    let f = |vol: f64| pricer.price(is_call, spot, strike, years, rate, vol) - target_price;

    let (mut f_lo, f_hi) = (f(lo), f(hi));
    if f_lo.signum() == f_hi.signum() {
        return None;
    }

    for _ in 0..IV_MAX_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let f_mid = f(mid);
        if f_mid.abs() < IV_TOLERANCE {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    None
}

/// Cache key per §4.3: `(token, floor(last_price, tick_size), floor(spot,
/// 0.5), floor(minutes_to_expiry))`. Using integers (not floats) keeps
/// the key `Eq`/`Hash`-able without the usual float-key pitfalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GreeksCacheKey {
    token: u32,
    price_bucket: i64,
    spot_bucket: i64,
    minutes_to_expiry: i64,
    monotonic_minute: i64,
}

fn floor_to_step(value: Decimal, step: Decimal) -> i64 {
    if step.is_zero() {
        return value.to_i64().unwrap_or(0);
    }
    ((value / step).floor()).to_i64().unwrap_or(0)
}

/// Everything the enricher needs about the underlying to compute Greeks
/// for one option tick.
#[derive(Debug, Clone, Copy)]
pub struct UnderlyingContext {
    pub spot: Decimal,
    pub spot_age: std::time::Duration,
}

/// One option tick's worth of context the caller hands to the enricher.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub tick: Tick,
    pub is_call: bool,
    pub strike: Decimal,
    pub tick_size: Decimal,
    pub years_to_expiry: f64,
    pub underlying: Option<UnderlyingContext>,
}

/// Enriches option ticks with Greeks, distributing work across a small
/// worker pool pinned by `token` (consistent hash) so per-token ordering
/// is preserved end to end.
///
/// Cheaply `Clone`: cloning only clones the `mpsc::Sender` handles into
/// the same worker pool, so every account's orchestrator can hold its
/// own handle onto one shared pool.
#[derive(Clone)]
pub struct GreeksEnricher {
    workers: Vec<mpsc::Sender<WorkItem>>,
}

struct WorkItem {
    request: EnrichmentRequest,
    reply: oneshot::Sender<Tick>,
}

impl GreeksEnricher {
    /// `worker_count` should be `min(NumCPU, 8)` per §4.3; the caller
    /// decides that, this type just spins up however many it's told to.
    /// `clock` is shared (not cloned per worker) so a single `FakeClock`
    /// in tests drives every worker's cache-invalidation boundary
    /// identically.
    pub fn spawn(
        worker_count: usize,
        config: GreeksConfig,
        pricer: impl OptionPricer + Clone + 'static,
        clock: std::sync::Arc<dyn Clock>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for _ in 0..worker_count {
            let (tx, mut rx) = mpsc::channel::<WorkItem>(256);
            let pricer = pricer.clone();
            let cache = Mutex::new(LruCache::<GreeksCacheKey, Greeks>::new(
                std::num::NonZeroUsize::new(config.cache_size.max(1)).unwrap(),
            ));
            let clock = clock.clone();
            tokio::spawn(async move {
                while let Some(item) = rx.recv().await {
                    let enriched = enrich_one(&item.request, &pricer, &cache, config, clock.as_ref());
                    let _ = item.reply.send(enriched);
                }
            });
            workers.push(tx);
        }

        Self { workers }
    }

    /// Route by consistent hash of `token` (§4.3: "pinning each token to
    /// one worker").
    pub async fn enrich(&self, request: EnrichmentRequest) -> Tick {
        let idx = worker_index(request.tick.token, self.workers.len());
        let (reply_tx, reply_rx) = oneshot::channel();
        let tick = request.tick.clone();
        if self.workers[idx]
            .send(WorkItem { request, reply: reply_tx })
            .await
            .is_err()
        {
            return tick;
        }
        reply_rx.await.unwrap_or(tick)
    }
}

fn worker_index(token: u32, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % worker_count
}

fn enrich_one(
    request: &EnrichmentRequest,
    pricer: &dyn OptionPricer,
    cache: &Mutex<LruCache<GreeksCacheKey, Greeks>>,
    config: GreeksConfig,
    clock: &dyn Clock,
) -> Tick {
    let mut tick = request.tick.clone();

    let underlying = match &request.underlying {
        Some(u) if u.spot_age <= config.max_spot_age => u,
        _ => {
            tick.greeks_stale = true;
            return tick;
        }
    };

    let key = GreeksCacheKey {
        token: request.tick.token,
        price_bucket: floor_to_step(request.tick.last_price, request.tick_size),
        spot_bucket: floor_to_step(underlying.spot, Decimal::new(5, 1)),
        minutes_to_expiry: (request.years_to_expiry * 365.0 * 24.0 * 60.0) as i64,
        monotonic_minute: clock.monotonic_minute(),
    };

    if let Some(greeks) = cache.lock().get(&key) {
        tick.greeks = Some(*greeks);
        return tick;
    }

    let spot = underlying.spot.to_f64().unwrap_or(0.0);
    let strike = request.strike.to_f64().unwrap_or(0.0);
    let target = request.tick.last_price.to_f64().unwrap_or(0.0);

    let iv = match implied_volatility(pricer, request.is_call, spot, strike, request.years_to_expiry, config.risk_free_rate, target) {
        Some(iv) => iv,
        None => return tick,
    };

    let (delta, gamma, theta, vega) = pricer.greeks(request.is_call, spot, strike, request.years_to_expiry, config.risk_free_rate, iv);

    let greeks = Greeks {
        iv: Decimal::from_f64_retain(iv).unwrap_or_default(),
        delta: Decimal::from_f64_retain(delta).unwrap_or_default(),
        gamma: Decimal::from_f64_retain(gamma).unwrap_or_default(),
        theta: Decimal::from_f64_retain(theta).unwrap_or_default(),
        vega: Decimal::from_f64_retain(vega).unwrap_or_default(),
    };

    cache.lock().put(key, greeks);
    tick.greeks = Some(greeks);
    tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn iv_round_trips_through_pricing() {
        let pricer = BlackScholesPricer;
        let true_vol = 0.22;
        let price = pricer.price(true, 100.0, 100.0, 0.25, 0.065, true_vol);
        let recovered = implied_volatility(&pricer, true, 100.0, 100.0, 0.25, 0.065, price).unwrap();
        assert!((recovered - true_vol).abs() < 1e-3);
    }

    #[test]
    fn no_convergence_returns_none_for_impossible_price() {
        let pricer = BlackScholesPricer;
        // A target far above any price achievable in [0.01, 5.0] vol.
        let recovered = implied_volatility(&pricer, true, 100.0, 100.0, 0.25, 0.065, 1_000_000.0);
        assert!(recovered.is_none());
    }

    #[test]
    fn stale_underlying_flags_greeks_stale_without_computing() {
        let pricer = BlackScholesPricer;
        let cache = Mutex::new(LruCache::new(std::num::NonZeroUsize::new(8).unwrap()));
        let request = EnrichmentRequest {
            tick: Tick::ltp(1, 0, dec!(10)),
            is_call: true,
            strike: dec!(100),
            tick_size: dec!(0.05),
            years_to_expiry: 0.1,
            underlying: Some(UnderlyingContext {
                spot: dec!(100),
                spot_age: std::time::Duration::from_secs(10),
            }),
        };
        let clock = tickgate_core::FakeClock::new(chrono::Utc::now());
        let tick = enrich_one(&request, &pricer, &cache, GreeksConfig::default(), &clock);
        assert!(tick.greeks_stale);
        assert!(tick.greeks.is_none());
    }

    #[test]
    fn missing_underlying_flags_greeks_stale() {
        let pricer = BlackScholesPricer;
        let cache = Mutex::new(LruCache::new(std::num::NonZeroUsize::new(8).unwrap()));
        let request = EnrichmentRequest {
            tick: Tick::ltp(1, 0, dec!(10)),
            is_call: true,
            strike: dec!(100),
            tick_size: dec!(0.05),
            years_to_expiry: 0.1,
            underlying: None,
        };
        let clock = tickgate_core::FakeClock::new(chrono::Utc::now());
        let tick = enrich_one(&request, &pricer, &cache, GreeksConfig::default(), &clock);
        assert!(tick.greeks_stale);
    }
}

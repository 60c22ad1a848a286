//! Session Orchestrator (§4.5): owns one upstream broker connection's
//! lifecycle per account, including the MOCK-mode Mock Ticker that
//! stands in for a real socket without altering downstream contracts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use tickgate_core::Clock;
use tickgate_integration::control::{UpstreamControl, WireMode};
use tickgate_integration::socket::{BrokerSocket, SocketEvent};
use tickgate_markets::registry::Snapshot;
use tickgate_markets::{InstrumentKind, SubscriptionMode, Token};

use crate::bus::TickBus;
use crate::greeks::{EnrichmentRequest, GreeksEnricher, UnderlyingContext};
use crate::normalizer::{Normalizer, BURST_COALESCE_THRESHOLD};
use crate::tick::Tick;

/// §4.5 state machine. `INVALID_TOKEN` and `RETRY_BACKOFF` are distinct
/// states because the former routes through the Token Refresher while
/// the latter is a plain reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    RetryBackoff,
    InvalidToken,
    Off,
}

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);
const BACKOFF_JITTER_FRACTION: f64 = 0.2;
const MAX_INVALID_TOKEN_FAILURES: u32 = 3;
const INVALID_TOKEN_WINDOW: Duration = Duration::from_secs(600);
/// Upper bound on how long `INVALID_TOKEN` waits for a
/// `TokenRefreshed` command before re-entering the state on its own
/// (§4.5: "≥3 failures in 10 min -> OFF"). Without this bound an account
/// whose refresh never arrives would block forever on `commands.recv()`
/// and the failure counter could never advance past one entry.
const INVALID_TOKEN_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Doubles each retry, capped at 60 s, ±20% jitter (§4.5 and §8 boundary
/// behavior: "never drops below 1 s or exceeds 60 s").
fn next_backoff(current: Duration, rng: &mut impl Rng) -> Duration {
    let doubled = current.saturating_mul(2).min(BACKOFF_CAP).max(BACKOFF_INITIAL);
    let jitter_span = doubled.as_secs_f64() * BACKOFF_JITTER_FRACTION;
    let jitter = rng.random_range(0.0..=jitter_span.max(0.0));
    Duration::from_secs_f64((doubled.as_secs_f64() + jitter).min(BACKOFF_CAP.as_secs_f64() * (1.0 + BACKOFF_JITTER_FRACTION)))
}

/// Command channel the Subscription Reconciler and Token Refresher use
/// to drive one orchestrator (§2: "writes to Session Orchestrators' RPC
/// channels, not their market-data channels").
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    Subscribe(Vec<Token>, SubscriptionMode),
    Unsubscribe(Vec<Token>),
    TokenRefreshed(String),
    SwitchToMock,
    SwitchToLive,
    Shutdown,
}

/// Outbound notification an orchestrator raises about its own session
/// state, for a caller (the Supervisor) that needs to react without
/// holding a back-pointer into this task (§9). Currently just the one
/// event the Token Refresher's automatic trigger needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEvent {
    InvalidToken,
}

/// What woke the `SUBSCRIBED` loop up: a socket event or an RPC command.
/// Exists so a socket event drained out-of-band while coalescing a burst
/// (see [`SessionOrchestrator::run`]'s `pending_event` slot) can be
/// dispatched through the same match arms as one that came straight off
/// `select!`.
enum SubscribedWake {
    Socket(Option<SocketEvent>),
    Command(Option<OrchestratorCommand>),
}

/// Deterministic synthetic tick generator for MOCK mode (§4.5: "content
/// is a random walk seeded by `(token, utc_day)` so tests are
/// deterministic").
pub struct MockTicker {
    rng_by_token: std::collections::HashMap<Token, StdRng>,
    utc_day: i64,
}

impl MockTicker {
    pub fn new(utc_day: i64) -> Self {
        Self {
            rng_by_token: std::collections::HashMap::new(),
            utc_day,
        }
    }

    /// Next synthetic tick for `token`, continuing that token's random
    /// walk from `last_price`.
    pub fn next_tick(&mut self, token: Token, last_price: Decimal, timestamp_us: i64) -> Tick {
        let rng = self.rng_by_token.entry(token).or_insert_with(|| {
            let seed = seed_for(token, self.utc_day);
            StdRng::seed_from_u64(seed)
        });
        let step_paisa: i32 = rng.random_range(-50..=50);
        let new_price = (last_price + Decimal::new(step_paisa as i64, 2)).max(Decimal::new(1, 2));

        let mut tick = Tick::ltp(token, timestamp_us, new_price);
        tick.source_mock = true;
        tick
    }
}

fn seed_for(token: Token, utc_day: i64) -> u64 {
    (u64::from(token) << 32) ^ (utc_day as u64)
}

/// Drives one account's upstream session end to end: connect,
/// authenticate, apply subscriptions, normalize inbound ticks onto the
/// bus, and reconnect with backoff on failure. Runs as a single task per
/// account per §5's scheduling model; never holds a lock across an
/// await.
pub struct SessionOrchestrator<C: Clock> {
    pub account_id: String,
    pub state: SessionState,
    clock: Arc<C>,
    backoff: Duration,
    invalid_token_failures: Vec<std::time::Instant>,
    normalizer: Normalizer,
    bus: TickBus,
    greeks: Option<GreeksEnricher>,
    events: Option<mpsc::Sender<AccountEvent>>,
    underlying_prices: HashMap<Token, (Decimal, Instant)>,
}

impl<C: Clock> SessionOrchestrator<C> {
    pub fn new(account_id: impl Into<String>, clock: Arc<C>, bus: TickBus) -> Self {
        Self {
            account_id: account_id.into(),
            state: SessionState::Disconnected,
            clock,
            backoff: BACKOFF_INITIAL,
            invalid_token_failures: Vec::new(),
            normalizer: Normalizer::new(),
            bus,
            greeks: None,
            events: None,
            underlying_prices: HashMap::new(),
        }
    }

    /// Wires the Greeks Enricher into the live tick path (§2: "Tick
    /// Normalizer -> Greeks Enricher (conditionally) -> Tick Bus").
    /// Without this, option ticks publish with `greeks: None` forever.
    pub fn with_greeks(mut self, greeks: GreeksEnricher) -> Self {
        self.greeks = Some(greeks);
        self
    }

    /// Wires a channel the Supervisor drains to react to this account's
    /// state transitions — currently just `INVALID_TOKEN`, so the
    /// automatic refresh-then-reconnect trigger (§4.8) can fire without
    /// this task holding a reference back to the Supervisor.
    pub fn with_events(mut self, events: mpsc::Sender<AccountEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Main loop: owns the socket, serializes inbound ticks and control
    /// commands through channels so the read loop never blocks on
    /// publish (§4.5 concurrency note).
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<OrchestratorCommand>,
        connect: impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Box<dyn BrokerSocket>, tickgate_core::GatewayError>> + Send>>,
        registry: tickgate_markets::registry::Snapshot,
    ) {
        let mut socket: Option<Box<dyn BrokerSocket>> = None;
        let mut desired: std::collections::BTreeMap<Token, SubscriptionMode> = std::collections::BTreeMap::new();
        let symbol_index: HashMap<String, Token> =
            registry.values().map(|i| (i.symbol.clone(), i.token)).collect();
        // A socket event drained via `try_recv` while coalescing a burst
        // that turns out not to be `Binary` (§4.2) is stashed here rather
        // than dropped, and dispatched on the next loop iteration ahead of
        // waiting on the socket again.
        let mut pending_event: Option<SocketEvent> = None;

        loop {
            match self.state {
                SessionState::Disconnected | SessionState::Connecting => {
                    self.state = SessionState::Connecting;
                    match connect().await {
                        Ok(s) => {
                            socket = Some(s);
                            self.state = SessionState::Authenticating;
                        }
                        Err(err) => {
                            warn!(account = %self.account_id, error = %err, "connect failed");
                            self.state = SessionState::RetryBackoff;
                        }
                    }
                }
                SessionState::Authenticating => {
                    // Auth is carried on the connect URL (§6.1); reaching
                    // this state with a socket means auth already
                    // succeeded, so promote straight to SUBSCRIBED and
                    // re-apply the last-known subscription set.
                    if let Some(sock) = socket.as_mut() {
                        if !desired.is_empty() {
                            let tokens: Vec<u32> = desired.keys().copied().collect();
                            let control = UpstreamControl::subscribe(tokens);
                            if let Ok(json) = control.to_json() {
                                let _ = sock.send_text(json).await;
                            }
                        }
                        self.backoff = BACKOFF_INITIAL;
                        self.state = SessionState::Subscribed;
                    } else {
                        self.state = SessionState::RetryBackoff;
                    }
                }
                SessionState::Subscribed => {
                    let sock = socket.as_mut().expect("subscribed implies a live socket");

                    let wake = if let Some(event) = pending_event.take() {
                        SubscribedWake::Socket(Some(event))
                    } else {
                        tokio::select! {
                            event = sock.recv() => SubscribedWake::Socket(event),
                            cmd = commands.recv() => SubscribedWake::Command(cmd),
                        }
                    };

                    match wake {
                        SubscribedWake::Socket(Some(SocketEvent::Binary(bytes))) => {
                            // §4.2 burst coalescing: drain whatever else is
                            // already buffered (without another await) up
                            // to the threshold before normalizing, instead
                            // of returning to `select!` once per packet.
                            let mut frames = vec![bytes];
                            while frames.len() < BURST_COALESCE_THRESHOLD {
                                match sock.try_recv() {
                                    Some(SocketEvent::Binary(more)) => frames.push(more),
                                    Some(other) => {
                                        pending_event = Some(other);
                                        break;
                                    }
                                    None => break,
                                }
                            }
                            let ts = self.clock.now_utc().timestamp_micros();
                            for buf in frames {
                                let ticks = self.normalizer.normalize_frame(&buf, ts, &registry);
                                for tick in ticks {
                                    let tick = self.enrich_if_option(tick, &registry, &symbol_index).await;
                                    self.bus.publish(tick);
                                }
                            }
                        }
                        SubscribedWake::Socket(Some(SocketEvent::Text(_))) => {}
                        SubscribedWake::Socket(Some(SocketEvent::Closed { code, reason })) => {
                            warn!(account = %self.account_id, code, reason, "upstream closed connection");
                            socket = None;
                            if code == tickgate_integration::error::IntegrationError::AUTH_REJECT_CLOSE_CODE {
                                self.state = SessionState::InvalidToken;
                                if let Some(events) = &self.events {
                                    let _ = events.try_send(AccountEvent::InvalidToken);
                                }
                            } else {
                                self.state = SessionState::RetryBackoff;
                            }
                        }
                        SubscribedWake::Socket(None) => {
                            socket = None;
                            self.state = SessionState::RetryBackoff;
                        }
                        SubscribedWake::Command(cmd) => {
                            match cmd {
                                Some(OrchestratorCommand::Subscribe(tokens, mode)) => {
                                    for t in &tokens { desired.insert(*t, mode); }
                                    if let Some(sock) = socket.as_mut() {
                                        if let Ok(json) = UpstreamControl::mode(mode_to_wire(mode), tokens).to_json() {
                                            let _ = sock.send_text(json).await;
                                        }
                                    }
                                }
                                Some(OrchestratorCommand::Unsubscribe(tokens)) => {
                                    for t in &tokens { desired.remove(t); }
                                    if let Some(sock) = socket.as_mut() {
                                        if let Ok(json) = UpstreamControl::unsubscribe(tokens).to_json() {
                                            let _ = sock.send_text(json).await;
                                        }
                                    }
                                }
                                Some(OrchestratorCommand::Shutdown) | None => {
                                    if let Some(sock) = socket.as_mut() { sock.close().await; }
                                    self.state = SessionState::Disconnected;
                                    return;
                                }
                                Some(OrchestratorCommand::SwitchToMock) => {
                                    if let Some(sock) = socket.as_mut() { sock.close().await; }
                                    socket = None;
                                    return; // caller drives the Mock Ticker loop instead
                                }
                                Some(OrchestratorCommand::SwitchToLive) | Some(OrchestratorCommand::TokenRefreshed(_)) => {}
                            }
                        }
                    }
                }
                SessionState::RetryBackoff => {
                    info!(account = %self.account_id, backoff_ms = self.backoff.as_millis(), "reconnecting after backoff");
                    sleep(self.backoff).await;
                    self.backoff = next_backoff(self.backoff, &mut rand::rng());
                    self.state = SessionState::Connecting;
                }
                SessionState::InvalidToken => {
                    let now = std::time::Instant::now();
                    self.invalid_token_failures.push(now);
                    self.invalid_token_failures
                        .retain(|t| now.saturating_duration_since(*t) < INVALID_TOKEN_WINDOW);
                    if self.invalid_token_failures.len() as u32 >= MAX_INVALID_TOKEN_FAILURES {
                        warn!(account = %self.account_id, "repeated auth failures, forcing account OFF");
                        self.state = SessionState::Off;
                    } else {
                        // The Supervisor's automatic refresh trigger (fed by
                        // the event sent above) should push TokenRefreshed
                        // shortly; wait for it, but bounded, since otherwise
                        // an account whose refresh never arrives would block
                        // here forever and this failure counter could never
                        // reach MAX_INVALID_TOKEN_FAILURES.
                        tokio::select! {
                            cmd = commands.recv() => {
                                match cmd {
                                    Some(OrchestratorCommand::TokenRefreshed(_)) => {
                                        self.state = SessionState::Connecting;
                                    }
                                    Some(OrchestratorCommand::Shutdown) | None => {
                                        self.state = SessionState::Disconnected;
                                        return;
                                    }
                                    _ => {}
                                }
                            }
                            _ = sleep(INVALID_TOKEN_RETRY_INTERVAL) => {
                                // no refresh arrived in time; loop back into
                                // INVALID_TOKEN so the failure window keeps
                                // advancing toward the OFF escalation.
                            }
                        }
                    }
                }
                SessionState::Off => {
                    return;
                }
            }
        }
    }

    /// MOCK-mode loop: emits synthetic ticks for `tokens` at roughly the
    /// upstream's cadence until a shutdown command arrives. Ticks carry
    /// `source=mock` per §4.5.
    pub async fn run_mock(&mut self, mut commands: mpsc::Receiver<OrchestratorCommand>, tokens: Vec<Token>, tick_interval: Duration) {
        let utc_day = self.clock.now_utc().num_days_from_ce();
        let mut ticker = MockTicker::new(i64::from(utc_day));
        let mut last_price: std::collections::HashMap<Token, Decimal> =
            tokens.iter().map(|t| (*t, Decimal::new(10000, 2))).collect();

        loop {
            tokio::select! {
                _ = sleep(tick_interval) => {
                    let ts = self.clock.now_utc().timestamp_micros();
                    for token in &tokens {
                        let price = *last_price.get(token).unwrap_or(&Decimal::new(10000, 2));
                        let tick = ticker.next_tick(*token, price, ts);
                        last_price.insert(*token, tick.last_price);
                        self.bus.publish(tick);
                    }
                }
                cmd = commands.recv() => {
                    if matches!(cmd, None | Some(OrchestratorCommand::Shutdown)) {
                        return;
                    }
                }
            }
        }
    }

    /// Tick Normalizer -> Greeks Enricher (conditionally) -> Tick Bus
    /// (§2). Non-option ticks pass through untouched; option ticks run
    /// through the enricher if one was wired via
    /// [`SessionOrchestrator::with_greeks`], using the freshest price
    /// this task has observed for the option's underlying as the spot.
    async fn enrich_if_option(&mut self, tick: Tick, registry: &Snapshot, symbol_index: &HashMap<String, Token>) -> Tick {
        self.underlying_prices.insert(tick.token, (tick.last_price, Instant::now()));

        let Some(greeks) = &self.greeks else { return tick };
        let Some(instrument) = registry.get(&tick.token) else { return tick };
        if !instrument.kind.is_option() {
            return tick;
        }
        let (Some(strike), Some(expiry)) = (instrument.strike, instrument.expiry) else {
            return tick;
        };

        let today = self.clock.now_utc().date_naive();
        let days_to_expiry = (expiry - today).num_days().max(0) as f64;
        let years_to_expiry = (days_to_expiry / 365.25).max(1.0 / 365.25);

        let underlying = instrument
            .underlying_symbol
            .as_deref()
            .and_then(|symbol| symbol_index.get(symbol))
            .and_then(|token| self.underlying_prices.get(token))
            .map(|(spot, at)| UnderlyingContext { spot: *spot, spot_age: at.elapsed() });

        let request = EnrichmentRequest {
            tick,
            is_call: instrument.kind == InstrumentKind::CallOption,
            strike,
            tick_size: instrument.tick_size,
            years_to_expiry,
            underlying,
        };
        greeks.enrich(request).await
    }
}

fn mode_to_wire(mode: SubscriptionMode) -> WireMode {
    match mode {
        SubscriptionMode::Ltp => WireMode::Ltp,
        SubscriptionMode::Quote => WireMode::Quote,
        SubscriptionMode::Full => WireMode::Full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap_or_drops_below_floor() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut backoff = BACKOFF_INITIAL;
        for _ in 0..50 {
            backoff = next_backoff(backoff, &mut rng);
            assert!(backoff >= BACKOFF_INITIAL);
            assert!(backoff <= BACKOFF_CAP.mul_f64(1.0 + BACKOFF_JITTER_FRACTION));
        }
    }

    #[test]
    fn mock_ticker_is_deterministic_for_same_seed() {
        let mut a = MockTicker::new(20114);
        let mut b = MockTicker::new(20114);
        let p0 = Decimal::new(10000, 2);
        let ta = a.next_tick(256265, p0, 0);
        let tb = b.next_tick(256265, p0, 0);
        assert_eq!(ta.last_price, tb.last_price);
        assert!(ta.source_mock);
    }

    #[test]
    fn mock_ticker_differs_across_utc_days() {
        let mut a = MockTicker::new(20114);
        let mut b = MockTicker::new(20115);
        let p0 = Decimal::new(10000, 2);
        let ta = a.next_tick(256265, p0, 0);
        let tb = b.next_tick(256265, p0, 0);
        assert_ne!(ta.last_price, tb.last_price);
    }
}

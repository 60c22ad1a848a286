//! The composition root (§9 "cyclic object graphs"): one [`Supervisor`]
//! owns every long-lived component and hands out opaque handles to
//! callers. Nothing it owns holds a back-pointer to the `Supervisor`
//! itself — a `Session Orchestrator` only knows its own command channel
//! and the `TickBus`, never the thing that spawned it.
//!
//! External collaborators (the calendar, the token issuer, the broker's
//! order RPC, and the function that turns an account id into a connect
//! URL) are constructor-injected rather than constructed here, since
//! §1 places all of them out of this core's scope.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Timelike};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tickgate_core::circuit_breaker::CircuitBreakerConfig;
use tickgate_core::shutdown::{AsyncShutdown, GRACEFUL_SHUTDOWN_DEADLINE};
use tickgate_core::{Clock, GatewayError, GatewayResult, SystemClock};
use tickgate_data::bus::TickBus;
use tickgate_data::greeks::{BlackScholesPricer, GreeksEnricher};
use tickgate_data::interest::InterestBook;
use tickgate_data::mode_manager::{CalendarClient, ModeManager, ModePolicy};
use tickgate_data::orchestrator::{AccountEvent, OrchestratorCommand, SessionOrchestrator};
use tickgate_data::reconciler::{AccountSlot, ReconcileDiff, SubscriptionReconciler, MAX_BATCH_SIZE};
use tickgate_data::token_refresher::{TokenIssuer, TokenRefresher};
use tickgate_execution::{BrokerOrderClient, OrderExecutor, OrderExecutorConfig, OrderTask, TaskStore};
use tickgate_integration::socket::{BrokerSocket, WsBrokerSocket};
use tickgate_markets::{AccountId, AccountMode, ConsumerId, InstrumentRegistry, SubscriptionMode, Token};
use tickgate_risk::OrderRequest;

use crate::config::Config;
use crate::health::{compute_health, AccountHealth, AccountModeLabel, HealthReport, SessionStateLabel, UpstreamLiveness};
use crate::token_store::TokenStore;

/// A spawned account task's externally visible handle: the command
/// channel the Reconciler/Token Refresher write to, and the join handle
/// the Supervisor waits on during shutdown. The orchestrator itself is
/// moved into the spawned task and is never observed from outside it
/// again — see [`Supervisor::account_health`] for how this crate derives
/// a health signal without reaching back into that owned state.
struct AccountHandle {
    mode: AccountMode,
    commands: mpsc::Sender<OrchestratorCommand>,
    join: JoinHandle<()>,
}

const MOCK_TICK_INTERVAL: Duration = Duration::from_millis(250);
const ACCOUNT_COMMAND_QUEUE: usize = 64;
/// How long an account may go without a tick before its health signal
/// degrades to `retry_backoff` (§6.4's intent applied per-account rather
/// than only at the upstream-wide level `UpstreamLiveness` covers).
const ACCOUNT_TICK_STALE_AFTER: Duration = Duration::from_secs(10);

/// Everything the process needs from outside this core to run for real:
/// a calendar, a token issuer, a broker order RPC client, durable task
/// and token stores, and a way to turn an account id into a connect URL.
/// All of §1's external collaborators in one place.
pub struct ExternalCollaborators {
    pub calendar: Box<dyn CalendarClient>,
    pub token_issuer: Arc<dyn TokenIssuer>,
    pub broker_order_client: Arc<dyn BrokerOrderClient>,
    pub task_store: Arc<dyn TaskStore>,
    pub token_store: Arc<dyn TokenStore>,
    pub ws_url: Arc<dyn Fn(&AccountId) -> String + Send + Sync>,
}

/// Owns every long-lived component (§9) and drives the account roster,
/// subscription reconciliation, token refresh, order dispatch, and
/// health reporting from one place.
pub struct Supervisor {
    config: Config,
    clock: Arc<SystemClock>,
    registry: Arc<InstrumentRegistry>,
    bus: TickBus,
    mode_manager: Arc<ModeManager<SystemClock>>,
    reconciler: Mutex<SubscriptionReconciler>,
    interests: Mutex<InterestBook>,
    greeks: GreeksEnricher,
    executor: Arc<OrderExecutor<SystemClock>>,
    token_refresher: Arc<TokenRefresher<SystemClock>>,
    token_store: Arc<dyn TokenStore>,
    ws_url: Arc<dyn Fn(&AccountId) -> String + Send + Sync>,
    accounts: Mutex<HashMap<AccountId, AccountHandle>>,
    token_to_account: Mutex<HashMap<Token, AccountId>>,
    last_tick_at: Mutex<HashMap<AccountId, Instant>>,
    bus_sample: Mutex<(Instant, u64)>,
}

impl Supervisor {
    /// Builds every component from `config` and the injected
    /// `collaborators`, but spawns no account tasks yet — call
    /// [`Supervisor::spawn_account`] once per configured account (or
    /// [`Supervisor::spawn_all_configured_accounts`]) after construction.
    pub fn new(
        config: Config,
        registry: Arc<InstrumentRegistry>,
        collaborators: ExternalCollaborators,
    ) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;

        let clock = Arc::new(SystemClock);
        let mode_manager = Arc::new(ModeManager::new(collaborators.calendar, SystemClock));
        let reconciler = Mutex::new(SubscriptionReconciler::new(config.reconciler.into()));
        let bus = TickBus::new();

        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get().min(8))
            .unwrap_or(4);
        let greeks = GreeksEnricher::spawn(
            worker_count,
            config.greeks.into(),
            BlackScholesPricer,
            clock.clone() as Arc<dyn Clock>,
        );

        let order_executor_config = OrderExecutorConfig {
            circuit: CircuitBreakerConfig::from(config.order.circuit),
            ..Default::default()
        };
        let executor = Arc::new(OrderExecutor::new(
            order_executor_config,
            clock.clone(),
            collaborators.task_store,
            collaborators.broker_order_client,
            registry.clone(),
        ));

        let refresher_config = config.token.to_refresher_config()?;
        let token_refresher = Arc::new(TokenRefresher::new(refresher_config, collaborators.token_issuer, clock.clone()));

        Ok(Self {
            config,
            clock,
            registry,
            bus,
            mode_manager,
            reconciler,
            interests: Mutex::new(InterestBook::new()),
            greeks,
            executor,
            token_refresher,
            token_store: collaborators.token_store,
            ws_url: collaborators.ws_url,
            accounts: Mutex::new(HashMap::new()),
            token_to_account: Mutex::new(HashMap::new()),
            last_tick_at: Mutex::new(HashMap::new()),
            bus_sample: Mutex::new((Instant::now(), 0)),
        })
    }

    /// Exposes the enricher so a downstream tick consumer can call
    /// `enrich` directly; this Supervisor does not itself sit the
    /// enricher inline on the normalizer's hot path, since doing so
    /// needs a live underlying-spot cache this core has nowhere else to
    /// own, and inventing one here would outrun what §4.3 specifies.
    pub fn greeks(&self) -> &GreeksEnricher {
        &self.greeks
    }

    /// Spawn every account named in `config.accounts` that isn't already
    /// running.
    pub fn spawn_all_configured_accounts(&self) -> GatewayResult<()> {
        let ids: Vec<AccountId> = self.config.accounts.keys().cloned().collect();
        for id in ids {
            if !self.accounts.lock().contains_key(&id) {
                self.spawn_account(&id)?;
            }
        }
        Ok(())
    }

    /// Evaluates the account's configured mode policy and spawns the
    /// matching task: a live `SessionOrchestrator::run` against a real
    /// socket, a `run_mock` ticker, or a dormant task that only waits for
    /// `Shutdown` when the account is `OFF`.
    pub fn spawn_account(&self, account_id: &AccountId) -> GatewayResult<()> {
        let account_cfg = self
            .config
            .accounts
            .get(account_id)
            .ok_or_else(|| GatewayError::Contract {
                kind: "unknown_account".to_string(),
                detail: account_id.clone(),
            })?;

        let mode = self.mode_manager.evaluate(account_cfg.mode.into(), &account_cfg.calendar);
        let (tx, rx) = mpsc::channel(ACCOUNT_COMMAND_QUEUE);
        let clock = self.clock.clone();
        let bus = self.bus.clone();
        let owned_id = account_id.clone();

        let join = match mode {
            AccountMode::Live => {
                let registry_snapshot = self.registry.snapshot();
                let ws_url = self.ws_url.clone();
                let connect_id = owned_id.clone();
                let greeks = self.greeks.clone();

                let (events_tx, events_rx) = mpsc::channel(ACCOUNT_COMMAND_QUEUE);
                self.spawn_invalid_token_refresh_listener(owned_id.clone(), tx.clone(), events_rx);

                tokio::spawn(async move {
                    let mut orchestrator = SessionOrchestrator::new(owned_id, clock, bus)
                        .with_greeks(greeks)
                        .with_events(events_tx);
                    let connect = move || {
                        let url = (ws_url)(&connect_id);
                        Box::pin(async move {
                            WsBrokerSocket::connect(&url)
                                .await
                                .map(|socket| Box::new(socket) as Box<dyn BrokerSocket>)
                                .map_err(|err| GatewayError::Transient(err.to_string()))
                        })
                            as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Box<dyn BrokerSocket>, GatewayError>> + Send>>
                    };
                    orchestrator.run(rx, connect, registry_snapshot).await;
                })
            }
            AccountMode::Mock => {
                let tokens = self.tokens_for_account(account_id);
                tokio::spawn(async move {
                    let mut orchestrator = SessionOrchestrator::new(owned_id, clock, bus);
                    orchestrator.run_mock(rx, tokens, MOCK_TICK_INTERVAL).await;
                })
            }
            AccountMode::Off => tokio::spawn(async move {
                let mut rx = rx;
                while let Some(cmd) = rx.recv().await {
                    if matches!(cmd, OrchestratorCommand::Shutdown) {
                        break;
                    }
                }
            }),
        };

        info!(account_id = %account_id, mode = %mode, "account session spawned");
        self.accounts.lock().insert(account_id.clone(), AccountHandle { mode, commands: tx, join });
        Ok(())
    }

    /// Drives §4.8's "on-demand" refresh trigger: reacts to the
    /// orchestrator's `INVALID_TOKEN` notification by refreshing the
    /// account's token and, on success, relaying `TokenRefreshed` back so
    /// the session can leave `INVALID_TOKEN` and reconnect. Runs for the
    /// lifetime of the spawned task that owns `events_rx`'s sender half;
    /// it exits once that sender is dropped (the account session ended).
    fn spawn_invalid_token_refresh_listener(
        &self,
        account_id: AccountId,
        commands: mpsc::Sender<OrchestratorCommand>,
        mut events: mpsc::Receiver<AccountEvent>,
    ) {
        let token_refresher = self.token_refresher.clone();
        let token_store = self.token_store.clone();
        tokio::spawn(async move {
            while let Some(AccountEvent::InvalidToken) = events.recv().await {
                match token_refresher.refresh_one(&account_id).await {
                    Ok(state) => {
                        token_store.put(&account_id, &state);
                        let _ = commands
                            .send(OrchestratorCommand::TokenRefreshed(state.access_token.expose().to_string()))
                            .await;
                    }
                    Err(err) => {
                        warn!(account_id = %account_id, error = %err, "automatic token refresh after auth rejection failed");
                    }
                }
            }
        });
    }

    /// Drives §4.8's scheduled and preemptive refresh scans: once per
    /// [`TokenRefresher::preemptive_scan_interval`], checks every
    /// configured account's stored token against
    /// `is_due_for_preemptive_refresh`, and once per `scheduled_hour`
    /// refreshes every account regardless of its stored expiry (guarded
    /// against firing twice within the same hour). Requires `self` behind
    /// an `Arc` since the scan outlives any single call into this type.
    pub fn spawn_token_refresh_scan(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(supervisor.token_refresher.preemptive_scan_interval());
            let mut last_scheduled_fire: Option<(NaiveDate, u32)> = None;
            loop {
                ticker.tick().await;

                let now = supervisor.clock.now_utc();
                let this_hour = (now.date_naive(), now.hour());
                let scheduled_due = supervisor.token_refresher.is_scheduled_refresh_hour()
                    && last_scheduled_fire != Some(this_hour);
                if scheduled_due {
                    last_scheduled_fire = Some(this_hour);
                }

                let account_ids: Vec<AccountId> = supervisor.config.accounts.keys().cloned().collect();
                for account_id in account_ids {
                    let preemptive_due = supervisor
                        .token_store
                        .get(&account_id)
                        .map(|state| supervisor.token_refresher.is_due_for_preemptive_refresh(&state))
                        .unwrap_or(true);
                    if scheduled_due || preemptive_due {
                        if let Err(err) = supervisor.refresh_account_token(&account_id).await {
                            warn!(account_id = %account_id, error = %err, "periodic token refresh failed");
                        }
                    }
                }
            }
        })
    }

    /// Drives §4.1's "auto: poll...cache for 60s" by re-running
    /// `ModeManager::evaluate` for every configured account on
    /// `interval` and, when the outcome differs from the account's
    /// currently spawned mode, tearing that session down and respawning
    /// it under the new mode (DESIGN.md's "re-spawn instead of
    /// hot-switch" tradeoff). Requires `self` behind an `Arc` for the
    /// same reason as [`Supervisor::spawn_token_refresh_scan`].
    pub fn spawn_mode_reevaluation(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                supervisor.reevaluate_modes();
            }
        })
    }

    fn reevaluate_modes(&self) {
        let ids: Vec<AccountId> = self.config.accounts.keys().cloned().collect();
        for id in ids {
            let Some(account_cfg) = self.config.accounts.get(&id) else { continue };
            let desired = self.mode_manager.evaluate(account_cfg.mode.into(), &account_cfg.calendar);
            let current = self.accounts.lock().get(&id).map(|handle| handle.mode);
            if current == Some(desired) {
                continue;
            }
            info!(account_id = %id, from = ?current, to = %desired, "mode re-evaluated, respawning account session");
            self.despawn_account(&id);
            if let Err(err) = self.spawn_account(&id) {
                warn!(account_id = %id, error = %err, "failed to respawn account after mode change");
            }
        }
    }

    /// Removes `account_id`'s running session from the roster and drains
    /// it in the background with the same deadline-then-abort policy
    /// [`Supervisor::shutdown`] applies at process exit, so a respawn
    /// triggered by [`Supervisor::reevaluate_modes`] never blocks the
    /// caller on a slow-to-drain task.
    fn despawn_account(&self, account_id: &AccountId) {
        if let Some(handle) = self.accounts.lock().remove(account_id) {
            let account_id = account_id.clone();
            tokio::spawn(async move {
                let _ = handle.commands.send(OrchestratorCommand::Shutdown).await;
                let abort_handle = handle.join.abort_handle();
                if tokio::time::timeout(GRACEFUL_SHUTDOWN_DEADLINE, handle.join).await.is_err() {
                    warn!(account_id = %account_id, "account task did not drain within the graceful shutdown deadline, aborting");
                    abort_handle.abort();
                }
            });
        }
    }

    fn tokens_for_account(&self, account_id: &AccountId) -> Vec<Token> {
        self.token_to_account
            .lock()
            .iter()
            .filter(|(_, owner)| *owner == account_id)
            .map(|(token, _)| *token)
            .collect()
    }

    /// Records that `consumer` wants `token` at (at least) `mode` (§4.4
    /// step 1). Takes effect on the next [`Supervisor::reconcile`] pass,
    /// not immediately.
    pub fn subscribe(&self, consumer: ConsumerId, token: Token, mode: SubscriptionMode) {
        self.interests.lock().subscribe(consumer, token, mode);
    }

    /// Removes `consumer`'s interest in `token` (§4.4 step 1). Once a
    /// token has no remaining holders it drops out of the next
    /// [`Supervisor::reconcile`] pass's `desired` map entirely.
    pub fn unsubscribe(&self, consumer: &ConsumerId, token: Token) {
        self.interests.lock().unsubscribe(consumer, token);
    }

    /// Drops every interest `consumer` holds in one sweep, e.g. when its
    /// downstream connection closes.
    pub fn drop_consumer(&self, consumer: &ConsumerId) {
        self.interests.lock().drop_consumer(consumer);
    }

    /// Runs one Subscription Reconciler pass (§4.4): first marks
    /// newly-expired instruments in the registry and reduces every
    /// consumer's interest down to `token -> max(holder.mode)` over the
    /// surviving non-expired tokens (step 1), then diffs that against
    /// each account's current upstream subscriptions and relays the
    /// resulting per-account diffs to each account's command channel,
    /// batched at [`MAX_BATCH_SIZE`] per call.
    pub fn reconcile(&self) {
        self.registry.mark_expired(self.clock.now_utc().date_naive());
        let desired = self.interests.lock().desired(&self.registry.snapshot());

        let slots: Vec<AccountSlot> = self
            .config
            .accounts
            .iter()
            .map(|(id, cfg)| AccountSlot {
                id: id.clone(),
                priority: cfg.priority as i32,
                is_live: self
                    .accounts
                    .lock()
                    .get(id)
                    .map(|h| h.mode == AccountMode::Live)
                    .unwrap_or(false),
            })
            .collect();

        let diffs = self.reconciler.lock().reconcile(&desired, &slots);

        {
            let mut token_to_account = self.token_to_account.lock();
            for (account_id, diff) in &diffs {
                for token in diff.to_add.keys().chain(diff.to_upgrade.keys()) {
                    token_to_account.insert(*token, account_id.clone());
                }
                for token in &diff.to_remove {
                    token_to_account.remove(token);
                }
            }
        }

        let accounts = self.accounts.lock();
        for (account_id, diff) in &diffs {
            if let Some(handle) = accounts.get(account_id) {
                send_diff(&handle.commands, diff);
            } else {
                warn!(account_id = %account_id, "reconcile diff for an account with no spawned session");
            }
        }
    }

    /// Records that `token` ticked just now, so the reconciler's eviction
    /// policy (§4.4 step 2) and this Supervisor's own per-account
    /// staleness tracking (used by [`Supervisor::health`]) both see it.
    pub fn note_tick(&self, token: Token) {
        self.reconciler.lock().note_tick(token, self.clock.monotonic_minute());
        self.bus.published_count();
        if let Some(account_id) = self.token_to_account.lock().get(&token).cloned() {
            self.last_tick_at.lock().insert(account_id, Instant::now());
        }
    }

    /// §6.3 `placeOrder`.
    pub fn submit_order(&self, request: OrderRequest) -> Result<OrderTask, tickgate_execution::ExecutionError> {
        self.executor.submit(request)
    }

    /// §6.3 `cancelOrder`.
    pub fn cancel_order(&self, task_id: &str) {
        self.executor.cancel(task_id);
    }

    /// §6.3 `getOrderStatus`.
    pub fn order_status(&self, task_id: &str) -> Option<OrderTask> {
        self.executor.status(task_id)
    }

    /// §6.3 `listDeadLetters`.
    pub fn list_dead_letters(&self) -> Vec<OrderTask> {
        self.executor.list_dead_letters()
    }

    /// Refreshes one account's token and relays the new access token to
    /// its running session via `OrchestratorCommand::TokenRefreshed`
    /// (§4.8). The new state is persisted to the token store either way
    /// so a later preemptive scan sees an accurate `expires_at`.
    pub async fn refresh_account_token(&self, account_id: &AccountId) -> GatewayResult<()> {
        match self.token_refresher.refresh_one(account_id).await {
            Ok(state) => {
                self.token_store.put(account_id, &state);
                if let Some(handle) = self.accounts.lock().get(account_id) {
                    let _ = handle.commands.send(OrchestratorCommand::TokenRefreshed(state.access_token.expose().to_string())).await;
                }
                Ok(())
            }
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "token refresh failed, leaving previous token in place");
                Err(err)
            }
        }
    }

    /// §6.4 `GET /health`. Each account's session state is approximated
    /// from externally observable signals (recent-tick recency, task
    /// liveness) rather than the orchestrator's own internal state,
    /// since that state is owned by the spawned task and this Supervisor
    /// never reaches back into it (§9: no back-pointers).
    pub fn health(&self) -> HealthReport {
        let accounts = self.accounts.lock();
        let last_tick_at = self.last_tick_at.lock();
        let now = Instant::now();

        let components: BTreeMap<String, AccountHealth> = accounts
            .iter()
            .map(|(id, handle)| {
                let session_state = if handle.join.is_finished() {
                    SessionStateLabel::Off
                } else {
                    match handle.mode {
                        AccountMode::Off => SessionStateLabel::Off,
                        AccountMode::Mock => SessionStateLabel::Subscribed,
                        AccountMode::Live => match last_tick_at.get(id) {
                            Some(at) if now.saturating_duration_since(*at) < ACCOUNT_TICK_STALE_AFTER => {
                                SessionStateLabel::Subscribed
                            }
                            Some(_) => SessionStateLabel::RetryBackoff,
                            None => SessionStateLabel::Connecting,
                        },
                    }
                };
                (id.clone(), AccountHealth { mode: AccountModeLabel::from(handle.mode), session_state })
            })
            .collect();
        drop(last_tick_at);
        drop(accounts);

        let market_is_open = matches!(
            self.mode_manager.evaluate(ModePolicy::Auto, &self.config.calendar.code),
            AccountMode::Live
        );
        let silent_for = self.bus_silence();

        compute_health(&components, UpstreamLiveness { silent_for, market_is_open })
    }

    /// Samples `TickBus::published_count` and tracks how long it has
    /// stood still, the basis for `UpstreamLiveness::silent_for`.
    fn bus_silence(&self) -> Duration {
        let mut sample = self.bus_sample.lock();
        let (last_changed, last_count) = *sample;
        let current_count = self.bus.published_count();
        if current_count != last_count {
            *sample = (Instant::now(), current_count);
            Duration::ZERO
        } else {
            Instant::now().saturating_duration_since(last_changed)
        }
    }
}

/// Relays one account's reconcile diff to its orchestrator, chunked at
/// [`MAX_BATCH_SIZE`] tokens per RPC call (§4.4 step 4).
fn send_diff(commands: &mpsc::Sender<OrchestratorCommand>, diff: &ReconcileDiff) {
    let mut by_mode: BTreeMap<SubscriptionMode, Vec<Token>> = BTreeMap::new();
    for (token, mode) in diff.to_add.iter().chain(diff.to_upgrade.iter()) {
        by_mode.entry(*mode).or_default().push(*token);
    }
    for (mode, tokens) in by_mode {
        for chunk in tokens.chunks(MAX_BATCH_SIZE) {
            let _ = commands.try_send(OrchestratorCommand::Subscribe(chunk.to_vec(), mode));
        }
    }
    for chunk in diff.to_remove.chunks(MAX_BATCH_SIZE) {
        let _ = commands.try_send(OrchestratorCommand::Unsubscribe(chunk.to_vec()));
    }
}

impl AsyncShutdown for Supervisor {
    type Result = ();

    /// Sends `Shutdown` to every account task and waits up to
    /// [`GRACEFUL_SHUTDOWN_DEADLINE`] for each to drain; a task still
    /// running past its deadline is aborted rather than awaited forever.
    async fn shutdown(&mut self) -> Self::Result {
        let handles: Vec<(AccountId, mpsc::Sender<OrchestratorCommand>, JoinHandle<()>)> = self
            .accounts
            .get_mut()
            .drain()
            .map(|(id, handle)| (id, handle.commands, handle.join))
            .collect();

        for (_, commands, _) in &handles {
            let _ = commands.send(OrchestratorCommand::Shutdown).await;
        }

        for (account_id, _, join) in handles {
            let abort_handle = join.abort_handle();
            match tokio::time::timeout(GRACEFUL_SHUTDOWN_DEADLINE, join).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(account_id = %account_id, "account task did not drain within the graceful shutdown deadline, aborting");
                    abort_handle.abort();
                }
            }
        }
    }
}

//! Order Executor (§4.7): idempotent, per-account-serialized order
//! dispatch with retry, failover, a circuit breaker per account, and a
//! dead-letter channel for exhausted tasks.
//!
//! One task per account owns that account's FIFO queue (§5 scheduling
//! model: "Each Session Orchestrator owns one task" generalizes here to
//! "each account's order queue owns one task" — the same
//! channel-mailbox-actor shape, not shared mutable state behind a lock).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use tickgate_core::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig};
use tickgate_core::Clock;
use tickgate_markets::{AccountId, InstrumentRegistry};
use tickgate_risk::{check::validate, OrderRequest};

use crate::broker::BrokerOrderClient;
use crate::error::ExecutionError;
use crate::idempotency::{derive_task_id, TaskId};
use crate::store::TaskStore;
use crate::types::OrderTask;

/// §5 "Per-account order queue: 10 000 requests".
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
const DEAD_LETTER_BUFFER: usize = 1024;
/// §4.7 retry cap regardless of `attempt_policy.backoff_base_ms`.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OrderExecutorConfig {
    pub queue_capacity: usize,
    pub circuit: CircuitBreakerConfig,
    /// HMAC signing secret for `task_id` derivation. Never logged.
    pub idempotency_secret: Vec<u8>,
}

impl Default for OrderExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            circuit: CircuitBreakerConfig::default(),
            idempotency_secret: Vec::new(),
        }
    }
}

struct DispatchJob {
    task_id: TaskId,
    request: OrderRequest,
    /// `[account_id, ...failover_accounts]`; `chain_index` is the
    /// account this job is currently queued against.
    chain: Vec<AccountId>,
    chain_index: usize,
}

type ActorMap = Arc<Mutex<HashMap<AccountId, mpsc::Sender<DispatchJob>>>>;
type BreakerMap = Arc<Mutex<HashMap<AccountId, Arc<CircuitBreaker>>>>;

/// Idempotent, per-account-serialized order dispatcher (§4.7).
pub struct OrderExecutor<C: Clock> {
    config: OrderExecutorConfig,
    clock: Arc<C>,
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn BrokerOrderClient>,
    registry: Arc<InstrumentRegistry>,
    actors: ActorMap,
    breakers: BreakerMap,
    cancelled: Arc<Mutex<HashSet<String>>>,
    dead_letter_tx: mpsc::Sender<OrderTask>,
    dead_letter_rx: Mutex<Option<mpsc::Receiver<OrderTask>>>,
}

impl<C: Clock + 'static> OrderExecutor<C> {
    pub fn new(
        config: OrderExecutorConfig,
        clock: Arc<C>,
        store: Arc<dyn TaskStore>,
        broker: Arc<dyn BrokerOrderClient>,
        registry: Arc<InstrumentRegistry>,
    ) -> Self {
        let (dead_letter_tx, dead_letter_rx) = mpsc::channel(DEAD_LETTER_BUFFER);
        Self {
            config,
            clock,
            store,
            broker,
            registry,
            actors: Arc::new(Mutex::new(HashMap::new())),
            breakers: Arc::new(Mutex::new(HashMap::new())),
            cancelled: Arc::new(Mutex::new(HashSet::new())),
            dead_letter_tx,
            dead_letter_rx: Mutex::new(Some(dead_letter_rx)),
        }
    }

    /// Take the dead-letter receiver once, for an operator-facing
    /// consumer (§4.7 "exposed on the DLQ channel for operator review").
    /// Returns `None` on a second call.
    pub fn take_dead_letter_receiver(&self) -> Option<mpsc::Receiver<OrderTask>> {
        self.dead_letter_rx.lock().take()
    }

    /// §6.3 `listDeadLetters()`.
    pub fn list_dead_letters(&self) -> Vec<OrderTask> {
        self.store.list_dead_letters()
    }

    /// §6.3 `getOrderStatus(task_id)`.
    pub fn status(&self, task_id: &str) -> Option<OrderTask> {
        self.store.get(task_id)
    }

    fn breaker_for(&self, account_id: &AccountId) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.circuit)))
            .clone()
    }

    /// §6.3 `placeOrder(OrderRequest) -> {task_id, initial_state}`.
    ///
    /// Validates (§7 contract/validation, fails fast, no task created on
    /// failure), derives the idempotent `task_id`, and either returns the
    /// existing task's current state for a duplicate submission or
    /// creates a new `Pending` task and enqueues it on the first
    /// account's FIFO queue.
    pub fn submit(&self, request: OrderRequest) -> Result<OrderTask, ExecutionError> {
        validate(&request, &self.registry)?;

        let task_id = derive_task_id(
            &self.config.idempotency_secret,
            &request.client_idempotency_key,
            &request.account_id,
        );

        if let Some(existing) = self.store.get(task_id.as_str()) {
            return Ok(existing);
        }

        let breaker = self.breaker_for(&request.account_id);
        match breaker.admit() {
            Admission::Rejected => return Err(ExecutionError::CircuitOpen(request.account_id.clone())),
            Admission::Allowed | Admission::Probe => {}
        }

        let task = OrderTask::new_pending(&task_id, request.account_id.clone(), self.clock.now_utc());
        self.store.put(&task);

        let mut chain = vec![request.account_id.clone()];
        chain.extend(request.failover_accounts.iter().cloned());

        let job = DispatchJob {
            task_id,
            request,
            chain,
            chain_index: 0,
        };

        self.enqueue(job)?;
        Ok(task)
    }

    /// §5 "Cancelled OrderTasks in `dispatching` state are not retried;
    /// they are marked `failed` with `cancelled=true`." Marks the
    /// cancellation intent; the account actor checks it before its next
    /// attempt or failover hop and honors it there (it cannot interrupt
    /// an in-flight broker RPC that has already been sent).
    pub fn cancel(&self, task_id: &str) {
        self.cancelled.lock().insert(task_id.to_string());
    }

    fn enqueue(&self, job: DispatchJob) -> Result<(), ExecutionError> {
        let account_id = job.chain[job.chain_index].clone();
        let sender = self.actor_for(&account_id);
        sender
            .try_send(job)
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => ExecutionError::QueueFull(account_id),
                mpsc::error::TrySendError::Closed(_) => ExecutionError::ActorUnavailable(account_id),
            })
    }

    fn actor_for(&self, account_id: &AccountId) -> mpsc::Sender<DispatchJob> {
        self.reenqueue().actor_for(account_id)
    }

    /// Builds a `'static` handle sharing this executor's actor/breaker
    /// maps, so a spawned worker can lazily spin up the next account's
    /// actor on failover without borrowing the executor itself.
    fn reenqueue(&self) -> Reenqueue {
        Reenqueue {
            actors: self.actors.clone(),
            breakers: self.breakers.clone(),
            queue_capacity: self.config.queue_capacity,
            circuit_config: self.config.circuit,
            store: self.store.clone(),
            broker: self.broker.clone(),
            clock: self.clock.clone(),
            cancelled: self.cancelled.clone(),
            dead_letter_tx: self.dead_letter_tx.clone(),
        }
    }
}

// The executor's own account map is shared (not borrowed) with spawned
// `'static` workers via `Arc`, so a worker can lazily spin up the next
// account's actor the first time a task fails over to an account it
// hasn't dispatched to yet, duplicating `OrderExecutor`'s own
// lazy-spawn logic in a `'static` context.
#[derive(Clone)]
struct Reenqueue {
    actors: ActorMap,
    breakers: BreakerMap,
    queue_capacity: usize,
    circuit_config: CircuitBreakerConfig,
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn BrokerOrderClient>,
    clock: Arc<dyn Clock>,
    cancelled: Arc<Mutex<HashSet<String>>>,
    dead_letter_tx: mpsc::Sender<OrderTask>,
}

impl Reenqueue {
    fn breaker_for(&self, account_id: &AccountId) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.circuit_config)))
            .clone()
    }

    fn actor_for(&self, account_id: &AccountId) -> mpsc::Sender<DispatchJob> {
        let mut actors = self.actors.lock();
        if let Some(sender) = actors.get(account_id) {
            return sender.clone();
        }
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let worker = AccountActorWorker {
            account_id: account_id.clone(),
            breaker: self.breaker_for(account_id),
            store: self.store.clone(),
            broker: self.broker.clone(),
            clock: self.clock.clone(),
            cancelled: self.cancelled.clone(),
            dead_letter_tx: self.dead_letter_tx.clone(),
            reenqueue: self.clone(),
        };
        tokio::spawn(worker.run(rx));
        actors.insert(account_id.clone(), tx.clone());
        tx
    }

    fn enqueue(&self, job: DispatchJob) {
        let account_id = job.chain[job.chain_index].clone();
        let sender = self.actor_for(&account_id);
        if sender.try_send(job).is_err() {
            warn!(account_id = %account_id, "failover target queue full or closed, dropping job");
        }
    }
}

struct AccountActorWorker {
    account_id: AccountId,
    breaker: Arc<CircuitBreaker>,
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn BrokerOrderClient>,
    clock: Arc<dyn Clock>,
    cancelled: Arc<Mutex<HashSet<String>>>,
    dead_letter_tx: mpsc::Sender<OrderTask>,
    reenqueue: Reenqueue,
}

impl AccountActorWorker {
    async fn run(self, mut rx: mpsc::Receiver<DispatchJob>) {
        while let Some(job) = rx.recv().await {
            self.process(job).await;
        }
    }

    async fn process(&self, job: DispatchJob) {
        let DispatchJob { task_id, request, chain, chain_index } = job;

        let mut task = match self.store.get(task_id.as_str()) {
            Some(task) => task,
            None => return, // task vanished from the store; nothing to do
        };

        if self.cancelled.lock().remove(task_id.as_str()) {
            task.mark_cancelled(self.clock.now_utc());
            self.store.put(&task);
            return;
        }

        match self.breaker.admit() {
            Admission::Rejected => {
                self.advance_or_dead_letter(task, task_id, request, chain, chain_index, "circuit_open".into())
                    .await;
                return;
            }
            Admission::Allowed | Admission::Probe => {}
        }

        task.state = crate::types::OrderState::Dispatching;
        self.store.put(&task);

        let max_attempts = request.attempt_policy.max_attempts.max(1);
        let mut last_error = String::new();

        loop {
            if self.cancelled.lock().remove(task_id.as_str()) {
                task.mark_cancelled(self.clock.now_utc());
                self.store.put(&task);
                return;
            }

            task.attempts += 1;
            self.store.put(&task);

            match self.broker.place_order(&self.account_id, &request).await {
                Ok(broker_order_id) => {
                    self.breaker.record(true);
                    task.mark_placed(broker_order_id, self.clock.now_utc());
                    self.store.put(&task);
                    info!(account_id = %self.account_id, task_id = %task_id, "order placed");
                    return;
                }
                Err(err) => {
                    self.breaker.record(false);
                    last_error = err.message().to_string();
                    warn!(account_id = %self.account_id, task_id = %task_id, error = %err, attempt = task.attempts, "order dispatch failed");

                    if !err.is_retriable() {
                        break; // non-retriable: no further attempts at this account
                    }
                    if task.attempts >= max_attempts {
                        break; // retries exhausted at this account
                    }

                    let delay = backoff_for(request.attempt_policy.backoff_base_ms, task.attempts);
                    sleep(delay).await;
                }
            }
        }

        self.advance_or_dead_letter(task, task_id, request, chain, chain_index, last_error)
            .await;
    }

    async fn advance_or_dead_letter(
        &self,
        mut task: OrderTask,
        task_id: TaskId,
        request: OrderRequest,
        chain: Vec<AccountId>,
        chain_index: usize,
        last_error: String,
    ) {
        let next_index = chain_index + 1;
        if next_index < chain.len() {
            task.account_id = chain[next_index].clone();
            task.last_error = Some(last_error);
            task.state = crate::types::OrderState::Pending;
            self.store.put(&task);
            info!(task_id = %task_id, from_account = %self.account_id, to_account = %chain[next_index], "failing over order to next account");
            self.reenqueue.enqueue(DispatchJob {
                task_id,
                request,
                chain,
                chain_index: next_index,
            });
        } else {
            task.mark_dead_lettered(last_error, self.clock.now_utc());
            self.store.put(&task);
            warn!(task_id = %task_id, account_id = %self.account_id, "order dead-lettered after exhausting retries and failover");
            let _ = self.dead_letter_tx.try_send(task);
        }
    }
}

/// `delay = base * 2^(attempt-1)` with jitter in `[0, base)`, capped at
/// 30s (§4.7).
fn backoff_for(base_ms: u64, attempt: u32) -> Duration {
    let base = Duration::from_millis(base_ms.max(1));
    let doubled = base.saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
    let capped = doubled.min(BACKOFF_CAP);
    let jitter = rand::rng().random_range(0..base_ms.max(1));
    (capped + Duration::from_millis(jitter)).min(BACKOFF_CAP + base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, ScriptedBrokerClient};
    use crate::store::InMemoryTaskStore;
    use crate::types::OrderState;
    use rust_decimal_macros::dec;
    use tickgate_core::SystemClock;
    use tickgate_markets::{ExchangeSegment, Instrument, InstrumentKind};
    use tickgate_risk::{AttemptPolicy, Product, Side, Validity, Variety};

    fn registry() -> Arc<InstrumentRegistry> {
        let registry = InstrumentRegistry::new();
        registry.replace_all([Instrument::spot(
            1,
            "RELIANCE",
            InstrumentKind::Equity,
            ExchangeSegment::NseEquity,
            dec!(0.05),
        )]);
        Arc::new(registry)
    }

    fn request(idempotency_key: &str, account_id: &str) -> OrderRequest {
        OrderRequest {
            client_idempotency_key: idempotency_key.to_string(),
            account_id: account_id.to_string(),
            instrument_token: 1,
            side: Side::Buy,
            quantity: 1,
            price: None,
            product: Product::Intraday,
            variety: Variety::Market,
            validity: Validity::Day,
            attempt_policy: AttemptPolicy {
                max_attempts: 3,
                backoff_base_ms: 1,
                jitter_cap_ms: 1,
            },
            failover_accounts: Vec::new(),
        }
    }

    async fn wait_for_terminal<C: Clock>(executor: &OrderExecutor<C>, task_id: &str) -> OrderTask {
        for _ in 0..500 {
            if let Some(task) = executor.status(task_id) {
                if task.state.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn duplicate_submission_returns_the_same_task_id_without_redispatch() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());
        let broker = Arc::new(ScriptedBrokerClient::new([Ok("BROKER-1".to_string())]));
        let executor = OrderExecutor::new(
            OrderExecutorConfig { idempotency_secret: b"secret".to_vec(), ..Default::default() },
            Arc::new(SystemClock),
            store,
            broker.clone(),
            registry(),
        );

        let first = executor.submit(request("K1", "primary")).unwrap();
        let second = executor.submit(request("K1", "primary")).unwrap();
        assert_eq!(first.task_id, second.task_id);

        wait_for_terminal(&executor, &first.task_id).await;
        assert_eq!(broker.call_count(), 1, "duplicate submission must not re-dispatch");
    }

    #[tokio::test]
    async fn successful_dispatch_marks_the_task_placed() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());
        let broker = Arc::new(ScriptedBrokerClient::new([Ok("BROKER-1".to_string())]));
        let executor = OrderExecutor::new(
            OrderExecutorConfig { idempotency_secret: b"secret".to_vec(), ..Default::default() },
            Arc::new(SystemClock),
            store,
            broker,
            registry(),
        );

        let task = executor.submit(request("K2", "primary")).unwrap();
        let terminal = wait_for_terminal(&executor, &task.task_id).await;
        assert_eq!(terminal.state, OrderState::Placed);
        assert_eq!(terminal.broker_order_id.as_deref(), Some("BROKER-1"));
    }

    #[tokio::test]
    async fn retriable_failure_retries_then_succeeds() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());
        let broker = Arc::new(ScriptedBrokerClient::new([
            Err(BrokerError::Retriable("timeout".into())),
            Ok("BROKER-2".to_string()),
        ]));
        let executor = OrderExecutor::new(
            OrderExecutorConfig { idempotency_secret: b"secret".to_vec(), ..Default::default() },
            Arc::new(SystemClock),
            store,
            broker.clone(),
            registry(),
        );

        let task = executor.submit(request("K3", "primary")).unwrap();
        let terminal = wait_for_terminal(&executor, &task.task_id).await;
        assert_eq!(terminal.state, OrderState::Placed);
        assert_eq!(broker.call_count(), 2);
    }

    #[tokio::test]
    async fn retries_exhausted_with_no_failover_dead_letters() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());
        let broker = Arc::new(ScriptedBrokerClient::new([
            Err(BrokerError::Retriable("e1".into())),
            Err(BrokerError::Retriable("e2".into())),
            Err(BrokerError::Retriable("e3".into())),
        ]));
        let executor = OrderExecutor::new(
            OrderExecutorConfig { idempotency_secret: b"secret".to_vec(), ..Default::default() },
            Arc::new(SystemClock),
            store,
            broker,
            registry(),
        );

        let task = executor.submit(request("K4", "primary")).unwrap();
        let terminal = wait_for_terminal(&executor, &task.task_id).await;
        assert_eq!(terminal.state, OrderState::DeadLettered);
    }

    #[tokio::test]
    async fn non_retriable_failure_fails_over_to_next_account() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());
        let broker = Arc::new(ScriptedBrokerClient::new([
            Err(BrokerError::NonRetriable("account suspended".into())),
            Ok("BROKER-3".to_string()),
        ]));
        let executor = OrderExecutor::new(
            OrderExecutorConfig { idempotency_secret: b"secret".to_vec(), ..Default::default() },
            Arc::new(SystemClock),
            store,
            broker.clone(),
            registry(),
        );

        let mut req = request("K5", "primary");
        req.failover_accounts = vec!["backup".to_string()];
        let task = executor.submit(req).unwrap();
        let terminal = wait_for_terminal(&executor, &task.task_id).await;
        assert_eq!(terminal.state, OrderState::Placed);
        assert_eq!(terminal.account_id, "backup");
    }

    #[tokio::test]
    async fn circuit_opens_after_five_consecutive_failures_and_rejects_new_submissions() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());
        let broker = Arc::new(ScriptedBrokerClient::new(
            std::iter::repeat_with(|| Err(BrokerError::Retriable("down".into()))).take(20),
        ));
        let executor = OrderExecutor::new(
            OrderExecutorConfig {
                idempotency_secret: b"secret".to_vec(),
                circuit: CircuitBreakerConfig { consecutive_failure_threshold: 5, ..Default::default() },
                ..Default::default()
            },
            Arc::new(SystemClock),
            store,
            broker,
            registry(),
        );

        let mut req = request("K6", "primary");
        req.attempt_policy.max_attempts = 1;
        let task = executor.submit(req.clone()).unwrap();
        wait_for_terminal(&executor, &task.task_id).await;

        for i in 0..4 {
            let mut r = req.clone();
            r.client_idempotency_key = format!("K6-{i}");
            let t = executor.submit(r).unwrap();
            wait_for_terminal(&executor, &t.task_id).await;
        }

        let mut last = req.clone();
        last.client_idempotency_key = "K6-final".into();
        let result = executor.submit(last);
        assert!(matches!(result, Err(ExecutionError::CircuitOpen(_))));
    }
}

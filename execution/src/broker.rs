//! Broker order RPC seam (§6.3) — distinct from the market-data socket
//! (§2: "writes to Session Orchestrators' RPC channels, not their
//! market-data channels"). The actual HTTP/RPC client that talks to a
//! broker's order API is external; this crate only needs the narrow
//! trait below to drive retry/failover/circuit-breaker policy against
//! it.

use async_trait::async_trait;

use tickgate_risk::OrderRequest;

/// Whether a broker RPC failure should be retried with backoff or
/// escalate straight to failover (§4.7: "Non-retriable failure (invalid
/// credentials, account suspended)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    Retriable(String),
    NonRetriable(String),
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retriable(msg) => write!(f, "retriable broker error: {msg}"),
            Self::NonRetriable(msg) => write!(f, "non-retriable broker error: {msg}"),
        }
    }
}

impl BrokerError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retriable(m) | Self::NonRetriable(m) => m,
        }
    }
}

/// External broker order RPC client (§6.3). One implementation per
/// broker; the Order Executor only knows this trait.
#[async_trait]
pub trait BrokerOrderClient: Send + Sync {
    /// Place an order against the given account. Returns the broker's
    /// own order id on success.
    async fn place_order(&self, account_id: &str, request: &OrderRequest) -> Result<String, BrokerError>;

    /// Cancel a previously placed order, keyed by `broker_order_id` —
    /// never by `task_id` (§4.7 "Observable side effects").
    async fn cancel_order(&self, account_id: &str, broker_order_id: &str) -> Result<(), BrokerError>;
}

/// In-memory double for tests: scripted outcomes per call, recorded
/// calls for assertions.
#[derive(Debug, Default)]
pub struct ScriptedBrokerClient {
    outcomes: parking_lot::Mutex<std::collections::VecDeque<Result<String, BrokerError>>>,
    calls: parking_lot::Mutex<Vec<(String, String)>>,
}

impl ScriptedBrokerClient {
    pub fn new(outcomes: impl IntoIterator<Item = Result<String, BrokerError>>) -> Self {
        Self {
            outcomes: parking_lot::Mutex::new(outcomes.into_iter().collect()),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BrokerOrderClient for ScriptedBrokerClient {
    async fn place_order(&self, account_id: &str, request: &OrderRequest) -> Result<String, BrokerError> {
        self.calls
            .lock()
            .push((account_id.to_string(), request.client_idempotency_key.clone()));
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BrokerError::NonRetriable("no more scripted outcomes".into())))
    }

    async fn cancel_order(&self, _account_id: &str, _broker_order_id: &str) -> Result<(), BrokerError> {
        Ok(())
    }
}

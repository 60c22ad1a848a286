//! `OrderTask` (spec §3) — the durable record one `OrderRequest`
//! resolves to, keyed by [`TaskId`](crate::idempotency::TaskId).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tickgate_markets::AccountId;

use crate::idempotency::TaskId;

/// §3 `OrderTask.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Dispatching,
    Placed,
    Failed,
    DeadLettered,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Placed | Self::Failed | Self::DeadLettered)
    }
}

/// §3 `OrderTask`. Invariant: for the lifetime of `task_id` the same
/// input always resolves to the same terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTask {
    #[serde(skip)]
    pub task_id: TaskIdRepr,
    pub account_id: AccountId,
    pub state: OrderState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub broker_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
    /// Set when a cancellation arrived while the task was `Dispatching`
    /// (§5 cancellation rule: marked `failed` with `cancelled=true`,
    /// never retried).
    pub cancelled: bool,
}

/// `TaskId` isn't `Serialize`/`Deserialize` itself (it's a thin wrapper
/// over a hex string with no serde derive), so the task table stores it
/// as plain text alongside the task, keyed externally by the same
/// string. This newtype exists purely so `OrderTask` can derive
/// `Serialize`/`Deserialize` for the JSONL task store without requiring
/// `TaskId` to carry serde impls it has no other use for.
pub type TaskIdRepr = String;

impl OrderTask {
    pub fn new_pending(task_id: &TaskId, account_id: AccountId, created_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.as_str().to_string(),
            account_id,
            state: OrderState::Pending,
            attempts: 0,
            last_error: None,
            broker_order_id: None,
            created_at,
            terminal_at: None,
            cancelled: false,
        }
    }

    pub fn mark_placed(&mut self, broker_order_id: String, now: DateTime<Utc>) {
        self.state = OrderState::Placed;
        self.broker_order_id = Some(broker_order_id);
        self.terminal_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = OrderState::Failed;
        self.last_error = Some(error.into());
        self.terminal_at = Some(now);
    }

    pub fn mark_dead_lettered(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = OrderState::DeadLettered;
        self.last_error = Some(error.into());
        self.terminal_at = Some(now);
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.cancelled = true;
        self.state = OrderState::Failed;
        self.last_error = Some("cancelled".to_string());
        self.terminal_at = Some(now);
    }
}

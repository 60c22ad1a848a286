//! Tick Bus (§4.6): pub/sub fan-out with per-subscriber bounded queues
//! and a drop-oldest policy so one slow subscriber never stalls
//! publishers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use crate::tick::Tick;

/// Default bound from §5 "Resource bounds"; overridable via
/// `bus.subscriber_queue` (§6.6).
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 1024;

/// Minimum gap between "queue full, dropped oldest" log lines for the
/// same subscriber (§4.6: "a single log event per subscriber per 10 s at
/// most").
const DROP_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// A live subscription: a predicate plus the bounded delivery channel.
struct Subscriber {
    id: u64,
    predicate: Box<dyn Fn(&Tick) -> bool + Send + Sync>,
    queue: Mutex<std::collections::VecDeque<Tick>>,
    capacity: usize,
    notify: mpsc::Sender<()>,
    dropped: AtomicU64,
    last_drop_log: Mutex<Option<Instant>>,
}

/// Handle returned to a subscriber: drains delivered ticks and exposes
/// its own drop counter for metrics.
pub struct Subscription {
    id: u64,
    bus: Arc<TickBusInner>,
    notify_rx: mpsc::Receiver<()>,
}

impl Subscription {
    /// Await and remove the next available tick, or `None` once the bus
    /// has been torn down.
    pub async fn recv(&mut self) -> Option<Tick> {
        loop {
            if let Some(tick) = self.bus.pop_for(self.id) {
                return Some(tick);
            }
            self.notify_rx.recv().await?;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.bus.dropped_count(self.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.remove(self.id);
    }
}

struct TickBusInner {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped_bus_full: AtomicU64,
}

/// Shared handle; cheap to clone, safe to call from many publisher
/// tasks concurrently (one task per Session Orchestrator per §5).
#[derive(Clone)]
pub struct TickBus {
    inner: Arc<TickBusInner>,
}

impl Default for TickBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TickBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TickBusInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                dropped_bus_full: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber with the given predicate and queue
    /// bound. Returns a handle to drain deliveries.
    pub fn subscribe(
        &self,
        capacity: usize,
        predicate: impl Fn(&Tick) -> bool + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (notify_tx, notify_rx) = mpsc::channel(1);
        let subscriber = Arc::new(Subscriber {
            id,
            predicate: Box::new(predicate),
            queue: Mutex::new(std::collections::VecDeque::with_capacity(capacity.min(256))),
            capacity,
            notify: notify_tx,
            dropped: AtomicU64::new(0),
            last_drop_log: Mutex::new(None),
        });
        self.inner.subscribers.lock().push(subscriber);
        Subscription {
            id,
            bus: self.inner.clone(),
            notify_rx,
        }
    }

    /// Publish one tick to every matching subscriber. Never suspends on
    /// a slow subscriber — full queues drop their oldest entry instead
    /// (§4.6 drop-oldest policy).
    pub fn publish(&self, tick: Tick) {
        let subscribers = self.inner.subscribers.lock();
        for subscriber in subscribers.iter() {
            if !(subscriber.predicate)(&tick) {
                continue;
            }
            let mut queue = subscriber.queue.lock();
            if queue.len() >= subscriber.capacity {
                queue.pop_front();
                subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                self.inner.dropped_bus_full.fetch_add(1, Ordering::Relaxed);
                self.maybe_log_drop(subscriber);
            }
            queue.push_back(tick.clone());
            drop(queue);
            let _ = subscriber.notify.try_send(());
            self.inner.published.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn maybe_log_drop(&self, subscriber: &Subscriber) {
        let mut last = subscriber.last_drop_log.lock();
        let now = Instant::now();
        let should_log = match *last {
            Some(prev) => now.saturating_duration_since(prev) >= DROP_LOG_INTERVAL,
            None => true,
        };
        if should_log {
            warn!(subscriber_id = subscriber.id, "subscriber queue full, dropped oldest tick");
            *last = Some(now);
        }
    }

    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    pub fn dropped_bus_full_count(&self) -> u64 {
        self.inner.dropped_bus_full.load(Ordering::Relaxed)
    }
}

impl TickBusInner {
    fn pop_for(&self, id: u64) -> Option<Tick> {
        let subscribers = self.subscribers.lock();
        let subscriber = subscribers.iter().find(|s| s.id == id)?;
        subscriber.queue.lock().pop_front()
    }

    fn dropped_count(&self, id: u64) -> u64 {
        let subscribers = self.subscribers.lock();
        subscribers
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn remove(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn matching_subscriber_receives_ticks_in_order() {
        let bus = TickBus::new();
        let mut sub = bus.subscribe(16, |t| t.token == 256265);

        bus.publish(Tick::ltp(256265, 1, dec!(100.10)));
        bus.publish(Tick::ltp(256265, 2, dec!(100.20)));
        bus.publish(Tick::ltp(999, 3, dec!(1.0)));

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.last_price, dec!(100.10));
        assert_eq!(second.last_price, dec!(100.20));
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_and_counts() {
        let bus = TickBus::new();
        let mut sub = bus.subscribe(2, |_| true);

        bus.publish(Tick::ltp(1, 1, dec!(1)));
        bus.publish(Tick::ltp(1, 2, dec!(2)));
        bus.publish(Tick::ltp(1, 3, dec!(3)));

        let first = sub.recv().await.unwrap();
        assert_eq!(first.timestamp_us, 2, "oldest (ts=1) should have been dropped");
        assert_eq!(sub.dropped_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_removes_the_subscriber() {
        let bus = TickBus::new();
        let sub = bus.subscribe(4, |_| true);
        drop(sub);
        bus.publish(Tick::ltp(1, 1, dec!(1)));
        assert_eq!(bus.published_count(), 0);
    }
}

//! In-process typed event bus (spec §4.6).
//!
//! Grounded in shape on `groblegark-oddjobs`'s `crates/daemon/src/event_bus.rs`
//! (a bus half that accepts events and a registration table that dispatches
//! them), but reworked away from WAL-backed delivery: §4.6 is explicit that
//! this bus has "no cross-process delivery — purely intra-process", so there
//! is nothing here to make durable or replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use oj_core::{EventName, EventPayload};
use parking_lot::Mutex;

/// A subscriber. Implementors should not panic, but a panicking handler
/// cannot take down `emit` — see [`EventBus::emit`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &EventPayload);
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&EventPayload) + Send + Sync,
{
    async fn handle(&self, payload: &EventPayload) {
        self(payload)
    }
}

/// Opaque handle returned by [`EventBus::subscribe`]/[`EventBus::once`],
/// usable to remove a single subscription early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    once: bool,
    handler: Arc<dyn EventHandler>,
}

/// Typed pub/sub, ordered by registration, with per-handler failure
/// isolation (spec §4.6).
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<EventName, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self { handlers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    fn register(&self, name: EventName, handler: Arc<dyn EventHandler>, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().entry(name).or_default().push(Subscription { id, once, handler });
        id
    }

    /// Register `handler` for `name`; handlers fire in registration order.
    pub fn subscribe(&self, name: EventName, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.register(name, handler, false)
    }

    /// Register a handler that unsubscribes itself after its first firing
    /// (spec §4.6 `once`).
    pub fn once(&self, name: EventName, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.register(name, handler, true)
    }

    pub fn unsubscribe(&self, name: EventName, id: SubscriptionId) {
        if let Some(subs) = self.handlers.lock().get_mut(&name) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Remove all subscriptions for `name`, or every subscription when
    /// `name` is `None` (spec §4.6 `clear`).
    pub fn clear(&self, name: Option<EventName>) {
        let mut handlers = self.handlers.lock();
        match name {
            Some(name) => {
                handlers.remove(&name);
            }
            None => handlers.clear(),
        }
    }

    /// Dispatch `payload` to every handler registered for its event name,
    /// in registration order. A handler that panics is isolated: the panic
    /// is caught, logged, and does not stop remaining handlers or propagate
    /// to the emitter (spec §4.6 "errors are logged, never re-thrown").
    pub async fn emit(&self, payload: EventPayload) {
        let name = payload.name();
        let subs = self.handlers.lock().get(&name).cloned().unwrap_or_default();
        if subs.is_empty() {
            return;
        }

        let mut fired_once = Vec::new();
        for sub in &subs {
            let handler = Arc::clone(&sub.handler);
            let payload = payload.clone();
            let outcome = tokio::spawn(async move { handler.handle(&payload).await }).await;
            if let Err(join_err) = outcome {
                tracing::error!(event = %name, error = %join_err, "event handler panicked");
            }
            if sub.once {
                fired_once.push(sub.id);
            }
        }

        if !fired_once.is_empty() {
            if let Some(subs) = self.handlers.lock().get_mut(&name) {
                subs.retain(|s| !fired_once.contains(&s.id));
            }
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;

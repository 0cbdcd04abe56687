//! Event dispatch and one-shot waiting

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::oneshot;

use super::error::{EventError, EventResult};
use super::listener::Listener;
use super::{Event, EventKind};

type WaiterMap = HashMap<EventKind, Vec<(u64, oneshot::Sender<Event>)>>;

// ============================================================================
// Event System
// ============================================================================

/// Publish/subscribe hub shared by all caches
#[derive(Debug, Default)]
pub struct EventSystem {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
    waiters: Arc<Mutex<WaiterMap>>,
    next_waiter_id: AtomicU64,
}

impl EventSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Adding an equal listener twice is a no-op.
    pub fn add_listener(&self, listener: Listener) {
        let mut listeners = lock(&self.listeners);
        let registered = listeners.entry(listener.kind()).or_default();
        if !registered.contains(&listener) {
            tracing::debug!(listener = %listener.name(), kind = %listener.kind(), "Listener added");
            registered.push(listener);
        }
    }

    /// Unregister a listener previously passed to [`add_listener`](Self::add_listener)
    pub fn remove_listener(&self, listener: &Listener) -> EventResult<()> {
        let mut listeners = lock(&self.listeners);
        let registered = listeners.entry(listener.kind()).or_default();
        match registered.iter().position(|l| l == listener) {
            Some(pos) => {
                registered.remove(pos);
                tracing::debug!(listener = %listener.name(), kind = %listener.kind(), "Listener removed");
                Ok(())
            }
            None => Err(EventError::ListenerNotRegistered {
                name: listener.name().to_string(),
                kind: listener.kind(),
            }),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock(&self.listeners).get(&kind).map_or(0, Vec::len)
    }

    /// Number of one-shot waiters still pending for `kind`
    pub fn pending_waiters(&self, kind: EventKind) -> usize {
        lock(&self.waiters).get(&kind).map_or(0, Vec::len)
    }

    /// Publish `event`.
    ///
    /// Every listener for the event's kind is started in its own task and every
    /// pending waiter for that kind is resolved with a clone of the event.
    /// Returns without awaiting the listeners.
    pub fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let listeners = lock(&self.listeners).get(&kind).cloned().unwrap_or_default();
        let waiters = lock(&self.waiters).remove(&kind).unwrap_or_default();

        tracing::debug!(
            kind = %kind,
            listeners = listeners.len(),
            waiters = waiters.len(),
            "Dispatching event"
        );

        for listener in &listeners {
            listener.trigger(event.clone());
        }

        for (_, sender) in waiters {
            // A dropped receiver means the waiter gave up; nothing to deliver.
            let _ = sender.send(event.clone());
        }
    }

    /// Register a one-shot waiter for the next event of `kind`.
    ///
    /// Registration happens immediately, so an event dispatched after this
    /// call returns is never missed, even if the returned future is polled
    /// later.
    pub fn subscribe_once(&self, kind: EventKind) -> PendingEvent {
        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.waiters).entry(kind).or_default().push((id, tx));

        PendingEvent {
            id,
            kind,
            receiver: Some(rx),
            waiters: Arc::downgrade(&self.waiters),
        }
    }

    /// Wait for the next event of `kind`, failing after `timeout` if given
    pub async fn wait_for(&self, kind: EventKind, timeout: Option<Duration>) -> EventResult<Event> {
        self.subscribe_once(kind).wait(timeout).await
    }
}

// ============================================================================
// Pending Event
// ============================================================================

/// A registered one-shot waiter.
///
/// Dropping it before it resolves removes the registration.
#[derive(Debug)]
pub struct PendingEvent {
    id: u64,
    kind: EventKind,
    receiver: Option<oneshot::Receiver<Event>>,
    waiters: Weak<Mutex<WaiterMap>>,
}

impl PendingEvent {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Wait for the event, failing after `timeout` if given
    pub async fn wait(mut self, timeout: Option<Duration>) -> EventResult<Event> {
        let kind = self.kind;
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(EventError::Closed { kind });
        };

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::debug!(kind = %kind, timeout_ms = limit.as_millis() as u64, "Event wait timed out");
                    return Err(EventError::Timeout {
                        kind,
                        timeout: limit,
                    });
                }
            },
            None => receiver.await,
        };

        self.receiver = None;
        received.map_err(|_| EventError::Closed { kind })
    }

    fn unregister(&self) {
        if let Some(waiters) = self.waiters.upgrade() {
            let mut waiters = lock(&waiters);
            if let Some(pending) = waiters.get_mut(&self.kind) {
                pending.retain(|(id, _)| *id != self.id);
                if pending.is_empty() {
                    waiters.remove(&self.kind);
                }
            }
        }
    }
}

impl Drop for PendingEvent {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.unregister();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

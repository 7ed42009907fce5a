//! Connection status reporting.
//!
//! The reducer emits a [`StatusEvent`] whenever the editor surface should
//! tell the user something about the connection. [`EventBus`] hands each one
//! to every live listener.

use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    /// A request completed. Emitted for every successful request.
    Success,
    /// Retries have slowed past the notice threshold.
    Delay { error: String },
    /// The session hit an error it could not retry away.
    Failure { error: String },
    /// Number of clients on the document, as last reported by the server.
    Users { count: u32 },
}

type Listener = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next: u64,
    entries: Vec<(u64, Listener)>,
}

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Listeners>,
}

/// Keeps a listener registered. Dropping it removes the listener.
#[must_use = "the listener is removed when the subscription is dropped"]
pub struct Subscription {
    bus: Weak<EventBus>,
    key: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().entries.retain(|(key, _)| *key != self.key);
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&StatusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.lock();
        let key = listeners.next;
        listeners.next += 1;
        listeners.entries.push((key, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(self),
            key,
        }
    }

    /// Calls every listener with `event`. The lock is released first, so a
    /// listener may subscribe or drop subscriptions.
    pub fn emit(&self, event: StatusEvent) {
        let listeners: Vec<Listener> = self
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

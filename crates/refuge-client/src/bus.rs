//! Typed fan-out of gateway events to in-process listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use refuge_types::events::{EventKind, GatewayEvent};

use crate::cache::QueryCache;
use crate::topics::topics_for;

type Handler = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

struct Listener {
    /// `None` listens to every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

type Listeners = Mutex<HashMap<u64, Listener>>;

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Listeners>,
    next_id: Arc<AtomicU64>,
}

/// Keeps a listener attached. Dropping it detaches the listener.
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.attach(Some(kind), Arc::new(handler))
    }

    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.attach(None, Arc::new(handler))
    }

    fn attach(&self, kind: Option<EventKind>, handler: Handler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Listener { kind, handler });
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Delivers `event` to every listener of its kind. Events without a
    /// kind (acknowledgements, `ready`) are not delivered.
    pub fn emit(&self, event: &GatewayEvent) {
        let Some(kind) = event.kind() else {
            return;
        };
        // Handlers run outside the lock so they may subscribe or drop handles.
        let handlers: Vec<Handler> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|l| l.kind.is_none_or(|k| k == kind))
            .map(|l| l.handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Marks the topics of every incoming event stale in `cache`.
    pub fn invalidate_on_events(&self, cache: Arc<QueryCache>) -> Subscription {
        self.on_any(move |event| cache.invalidate_all(topics_for(event)))
    }
}

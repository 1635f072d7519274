//! Listener registries: event-name -> payload-consumer multiset, plus session-open/close
//! observer sets (§3, §4.6).
//!
//! These are local, not replicated. The event-listener map is the one structure the session
//! allows concurrent reads of (§5): it is wrapped in an `Arc<RwLock<..>>` so the publish handler
//! installed on a [`crate::Connection`] can dispatch inbound events without blocking the
//! executor, and dispatch never holds the write lock while invoking user code.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::RwLock;

use crate::session::SessionId;
use crate::EventPayload;

type EventListener<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// A cloneable, `'static` handle used to dispatch inbound events without borrowing the owning
/// [`Listeners`] (needed because the handle is captured by a publish handler installed on a
/// connection that outlives any single call into the session).
#[derive(Clone)]
pub(crate) struct EventListenersHandle<P> {
    map: Arc<RwLock<HashMap<String, Vec<EventListener<P>>>>>,
}

impl<P: EventPayload> EventListenersHandle<P> {
    /// Invoke every listener registered for `name` with `payload`. Snapshots the listener list
    /// under the read lock, then releases it before invoking any callback.
    pub(crate) fn dispatch(&self, name: &str, payload: &P) {
        let snapshot: Vec<EventListener<P>> = {
            let map = self.map.read().expect("event listener map poisoned");
            map.get(name).cloned().unwrap_or_default()
        };
        for listener in snapshot {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(payload)));
            if let Err(panic) = result {
                tracing::error!(event = name, ?panic, "event listener panicked; session continues");
            }
        }
    }
}

pub(crate) struct Listeners<P> {
    events: EventListenersHandle<P>,
    close: Vec<Box<dyn FnOnce(SessionId) + Send>>,
    open: Vec<Box<dyn FnOnce(SessionId) + Send>>,
}

impl<P: EventPayload> Listeners<P> {
    pub(crate) fn new() -> Self {
        Self {
            events: EventListenersHandle {
                map: Arc::new(RwLock::new(HashMap::new())),
            },
            close: Vec::new(),
            open: Vec::new(),
        }
    }

    pub(crate) fn event_listeners_handle(&self) -> EventListenersHandle<P> {
        self.events.clone()
    }

    pub(crate) fn on_event(&mut self, name: String, listener: impl Fn(&P) + Send + Sync + 'static) {
        let mut map = self.events.map.write().expect("event listener map poisoned");
        map.entry(name).or_default().push(Arc::new(listener));
    }

    pub(crate) fn on_close(&mut self, listener: impl FnOnce(SessionId) + Send + 'static) {
        self.close.push(Box::new(listener));
    }

    pub(crate) fn on_open(&mut self, listener: impl FnOnce(SessionId) + Send + 'static) {
        self.open.push(Box::new(listener));
    }

    /// Run and clear every registered close listener, catching and logging panics so one bad
    /// listener cannot destabilize the session (§7).
    pub(crate) fn notify_close(&mut self, id: SessionId) {
        for listener in self.close.drain(..) {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(id)));
            if let Err(panic) = result {
                tracing::error!(session = %id, ?panic, "close listener panicked; session continues");
            }
        }
    }

    /// Run and clear every registered open listener. Not called automatically by
    /// [`crate::Session::open`] (§4.6); an external registrar invokes this once open is visible.
    pub(crate) fn notify_open(&mut self, id: SessionId) {
        for listener in self.open.drain(..) {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(id)));
            if let Err(panic) = result {
                tracing::error!(session = %id, ?panic, "open listener panicked; session continues");
            }
        }
    }
}

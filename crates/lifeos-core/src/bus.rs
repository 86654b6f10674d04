use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Listener callback. Errors and panics are contained per listener.
pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Monotonic listener identifier, unique for the lifetime of a bus.
pub type ListenerId = u64;

struct ListenerEntry {
    id: ListenerId,
    owner: String,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    listeners: HashMap<String, Vec<ListenerEntry>>,
    next_id: ListenerId,
}

/// Diagnostic view of one event's listeners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub event: String,
    pub listener_count: usize,
    pub owners: Vec<String>,
}

/// Synchronous publish/subscribe registry.
///
/// Cloning yields another handle to the same registry. Independent buses
/// (separate `EventBus::new()` calls) never share listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

/// Handle returned by [`EventBus::on`]. Dropping it does not unsubscribe.
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    event: String,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => remove_listener(&mut inner.lock(), &self.event, self.id),
            None => false,
        }
    }
}

fn remove_listener(inner: &mut BusInner, event: &str, id: ListenerId) -> bool {
    let Some(list) = inner.listeners.get_mut(event) else {
        return false;
    };
    let before = list.len();
    list.retain(|l| l.id != id);
    let removed = list.len() != before;
    if list.is_empty() {
        inner.listeners.remove(event);
    }
    removed
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. `owner` labels the listener in logs
    /// and diagnostics.
    pub fn on<F>(&self, event: &str, owner: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(ListenerEntry {
                id,
                owner: owner.to_string(),
                handler: Arc::new(handler),
            });
        debug!(event, owner, listener_id = id, "listener registered");
        Subscription {
            bus: Arc::downgrade(&self.inner),
            event: event.to_string(),
            id,
        }
    }

    /// Invoke every listener of `event` in registration order and return how
    /// many ran. The listener list is snapshotted first, so listeners may
    /// subscribe, unsubscribe or emit without deadlocking.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        let snapshot: Vec<(ListenerId, String, Handler)> = {
            let inner = self.inner.lock();
            match inner.listeners.get(event) {
                Some(list) => list
                    .iter()
                    .map(|l| (l.id, l.owner.clone(), Arc::clone(&l.handler)))
                    .collect(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            debug!(event, "emit with no listeners");
            return 0;
        }

        for (id, owner, handler) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event, owner = %owner, listener_id = id, error = %e, "listener failed");
                }
                Err(_panic) => {
                    error!(event, owner = %owner, listener_id = id, "listener panicked");
                }
            }
        }
        snapshot.len()
    }

    /// Remove one listener by id.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        remove_listener(&mut self.inner.lock(), event, id)
    }

    /// Remove every listener of `event`, returning how many were removed.
    pub fn off_all(&self, event: &str) -> usize {
        self.inner
            .lock()
            .listeners
            .remove(event)
            .map_or(0, |l| l.len())
    }

    /// Drop all listeners. Listener ids keep increasing.
    pub fn clear(&self) {
        self.inner.lock().listeners.clear();
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.inner
            .lock()
            .listeners
            .get(event)
            .is_some_and(|l| !l.is_empty())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.lock().listeners.get(event).map_or(0, |l| l.len())
    }

    /// Snapshot of all events with listeners, sorted by event name.
    pub fn list_events(&self) -> Vec<EventSummary> {
        let inner = self.inner.lock();
        let mut events: Vec<EventSummary> = inner
            .listeners
            .iter()
            .map(|(event, list)| EventSummary {
                event: event.clone(),
                listener_count: list.len(),
                owners: list.iter().map(|l| l.owner.clone()).collect(),
            })
            .collect();
        events.sort_by(|a, b| a.event.cmp(&b.event));
        events
    }
}

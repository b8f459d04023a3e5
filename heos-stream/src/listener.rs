//! Listener interface and registry
//!
//! Listeners are held weakly: the registry never keeps a listener alive, and
//! entries whose listener was dropped are pruned on the next dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use heos_api::HeosEvent;

/// Callbacks for connectivity transitions and change events
///
/// All methods run on the event dispatcher thread, one at a time, so an
/// implementation may block or call back into the session.
pub trait HeosListener: Send + Sync {
    fn on_connection_lost(&self) {}

    fn on_connection_restored(&self) {}

    fn on_event(&self, _event: &HeosEvent) {}
}

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Concurrent set of registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: DashMap<ListenerId, Weak<dyn HeosListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener without taking ownership of it
    pub fn register<L>(&self, listener: &Arc<L>) -> ListenerId
    where
        L: HeosListener + 'static,
    {
        let weak: Weak<dyn HeosListener> = Arc::downgrade(listener) as Weak<dyn HeosListener>;
        self.register_weak(weak)
    }

    pub fn register_weak(&self, listener: Weak<dyn HeosListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, listener);
        tracing::debug!("Registered {}", id);
        id
    }

    /// Returns true if the listener was registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            tracing::debug!("Unregistered {}", id);
        }
        removed
    }

    /// Live listeners at this instant, ordered by registration
    ///
    /// Callbacks are invoked on the snapshot, never while the map is
    /// borrowed, so callbacks are free to register or unregister.
    pub fn snapshot(&self) -> Vec<Arc<dyn HeosListener>> {
        self.listeners.retain(|_, weak| weak.strong_count() > 0);

        let mut live: Vec<(ListenerId, Arc<dyn HeosListener>)> = self
            .listeners
            .iter()
            .filter_map(|entry| entry.value().upgrade().map(|l| (*entry.key(), l)))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live.into_iter().map(|(_, listener)| listener).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

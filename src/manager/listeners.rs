//! Event listener registry.
//!
//! Listeners are stored per event name in registration order. Dispatch
//! snapshots the callbacks under the lock and invokes them after
//! releasing it, so a callback may register or unsubscribe listeners
//! (including itself) without deadlocking.
//!
//! A panicking callback is caught and logged; the remaining callbacks
//! still run. This relies on unwinding: a binary built with
//! `panic = "abort"` terminates on the first listener panic instead.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{error, trace};

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Callback for one named event.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback for every application event.
pub type AnyCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    named: FxHashMap<String, Vec<(ListenerId, EventCallback)>>,
    any: Vec<(ListenerId, AnyCallback)>,
}

impl Registry {
    fn remove(&mut self, id: ListenerId) -> bool {
        let found = self.named.iter_mut().find_map(|(name, entries)| {
            let index = entries.iter().position(|(entry, _)| *entry == id)?;
            entries.remove(index);
            Some((name.clone(), entries.is_empty()))
        });

        if let Some((name, emptied)) = found {
            if emptied {
                self.named.remove(&name);
            }
            return true;
        }

        if let Some(index) = self.any.iter().position(|(entry, _)| *entry == id) {
            self.any.remove(index);
            return true;
        }

        false
    }
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Shared listener table.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ListenerRegistry")
            .field("events", &inner.named.len())
            .field("any", &inner.any.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `name`.
    pub fn add(&self, name: impl Into<String>, callback: EventCallback) -> Subscription {
        let id = ListenerId::generate();
        let name = name.into();
        trace!(%id, event = %name, "Listener added");

        self.inner
            .lock()
            .named
            .entry(name)
            .or_default()
            .push((id, callback));

        self.subscription(id)
    }

    /// Registers a catch-all callback.
    pub fn add_any(&self, callback: AnyCallback) -> Subscription {
        let id = ListenerId::generate();
        trace!(%id, "Catch-all listener added");

        self.inner.lock().any.push((id, callback));
        self.subscription(id)
    }

    fn subscription(&self, id: ListenerId) -> Subscription {
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Number of listeners for `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.inner.lock().named.get(name).map_or(0, Vec::len)
    }

    /// Runs the listeners for `name`, in registration order.
    ///
    /// Returns how many ran.
    pub fn dispatch(&self, name: &str, payload: &Value) -> usize {
        let callbacks: Vec<EventCallback> = self
            .inner
            .lock()
            .named
            .get(name)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                error!(event = %name, "Listener panicked");
            }
        }

        callbacks.len()
    }

    /// Runs the catch-all listeners.
    pub fn dispatch_any(&self, name: &str, payload: &Value) {
        let callbacks: Vec<AnyCallback> = self
            .inner
            .lock()
            .any
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(name, payload))).is_err() {
                error!(event = %name, "Catch-all listener panicked");
            }
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registration.
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Listener id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes exactly this registration.
    ///
    /// Returns `false` if it was already removed or the manager is gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };

        let removed = registry.lock().remove(self.id);
        if removed {
            trace!(id = %self.id, "Listener removed");
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

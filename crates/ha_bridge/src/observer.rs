//! Observer registrations for state-change callbacks.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;
use tracing::error;

use crate::state::EntityState;

/// Callback invoked with `(entity_id, new_state, old_state)`.
pub type StateChangedCallback = dyn Fn(&str, &EntityState, Option<&EntityState>) + Send + Sync;

#[derive(Clone)]
pub(crate) struct Observer {
    id: u64,
    callback: Arc<StateChangedCallback>,
}

impl Observer {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Invoke the callback, containing any panic so later observers still run.
    pub fn notify(&self, entity_id: &str, new_state: &EntityState, old_state: Option<&EntityState>) {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            (self.callback)(entity_id, new_state, old_state)
        }));
        if result.is_err() {
            error!(
                "State change observer {} panicked while handling {}",
                self.id, entity_id
            );
        }
    }
}

/// Registered observers in registration order.
///
/// Readers load an immutable `Arc<Vec<_>>`, writers publish a new one, so an
/// observer may unsubscribe (itself or others) while a notification pass is
/// iterating an older list.
pub(crate) struct ObserverList {
    next_id: AtomicU64,
    observers: ArcSwap<Vec<Observer>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn register(&self, callback: Arc<StateChangedCallback>) -> Observer {
        let observer = Observer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            callback,
        };
        self.observers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(observer.clone());
            next
        });
        observer
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn remove(&self, id: u64) -> bool {
        let previous = self.observers.rcu(|current| {
            current
                .iter()
                .filter(|o| o.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|o| o.id == id)
    }

    pub fn load(&self) -> Arc<Vec<Observer>> {
        self.observers.load_full()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.observers.load().len()
    }
}

/// Handle returned by `Bridge::on_state_changed`.
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverList>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: u64, observers: &Arc<ObserverList>) -> Self {
        Self {
            id,
            observers: Arc::downgrade(observers),
            active: AtomicBool::new(true),
        }
    }

    /// Deregister the callback. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(observers) = self.observers.upgrade() {
            observers.remove(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

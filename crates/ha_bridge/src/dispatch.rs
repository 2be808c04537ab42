//! Change dispatcher: applies incoming changes to the store and fans them out.

use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::warn;

use crate::observer::ObserverList;
use crate::observer::StateChangedCallback;
use crate::observer::Subscription;
use crate::protocol;
use crate::protocol::Frame;
use crate::state::EntityState;
use crate::state::StateChange;
use crate::store::EntityStore;
use crate::store::sorted_entries;

/// Capacity of the change stream handed out by `Bridge::subscribe`.
/// Receivers that fall further behind lose the oldest changes.
const CHANGE_CHANNEL_SIZE: usize = 256;

pub(crate) struct Dispatcher {
    store: EntityStore,
    observers: Arc<ObserverList>,
    changes: broadcast::Sender<StateChange>,

    /// Held for a whole notification pass or replay so a new observer never
    /// sees a live change before its replay has finished. Reentrant so a
    /// callback may register further observers on the delivering thread.
    delivery: ReentrantMutex<()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            store: EntityStore::default(),
            observers: Arc::new(ObserverList::new()),
            changes,
            delivery: ReentrantMutex::new(()),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Handle one text frame from the transport. Never fails: malformed
    /// frames are logged and dropped.
    pub fn handle_frame(&self, text: &str) {
        match protocol::decode(text) {
            Ok(Frame::StateChanged { entity_id, .. }) if entity_id.is_empty() => {
                warn!("Ignoring state change without an entity id");
            }
            Ok(Frame::StateChanged { entity_id, state }) => self.apply(entity_id, state),
            Ok(Frame::Other) => debug!("Ignoring frame: {}", text),
            Err(e) => warn!("Error parsing WebSocket message: {}", e),
        }
    }

    /// Store `new_state` and notify observers with the state it replaced.
    pub fn apply(&self, entity_id: String, new_state: EntityState) {
        let _delivery = self.delivery.lock();

        let (old_state, observers) = {
            let mut entries = self.store.lock();
            let old_state = entries.insert(entity_id.clone(), new_state.clone());
            (old_state, self.observers.load())
        };

        debug!(
            "{}: {} -> {}",
            entity_id,
            old_state.as_ref().map_or("<none>", |s| s.state.as_str()),
            new_state.state
        );

        for observer in observers.iter() {
            observer.notify(&entity_id, &new_state, old_state.as_ref());
        }

        // No receivers is fine
        let _ = self.changes.send(StateChange {
            entity_id,
            new_state,
            old_state,
        });
    }

    /// Register an observer and replay every stored entity to it with no
    /// previous state. Live changes reach the observer only after the
    /// replay completes.
    pub fn subscribe(&self, callback: Arc<StateChangedCallback>) -> Subscription {
        let _delivery = self.delivery.lock();

        let (observer, replay) = {
            let entries = self.store.lock();
            let observer = self.observers.register(callback);
            (observer, sorted_entries(&entries))
        };

        for (entity_id, state) in &replay {
            observer.notify(entity_id, state, None);
        }

        Subscription::new(observer.id(), &self.observers)
    }

    pub fn stream(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

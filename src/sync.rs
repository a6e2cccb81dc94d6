//! View-state reconciliation over the event bus
//!
//! A view binds each collection it depends on once at mount. The bound slot
//! is filled immediately and replaced wholesale on every topic signal —
//! never patched incrementally. Dropping the synchronizer tears down every
//! subscription (unmount).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::bus::{EventBus, Subscription, Topic};

/// A view's working copy of one fetched value
pub type Shared<T> = Arc<RwLock<T>>;

pub struct Synchronizer {
    bus: Arc<EventBus>,
    subscriptions: Vec<Subscription>,
}

impl Synchronizer {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            subscriptions: Vec::new(),
        }
    }

    /// Fetch now, then re-fetch and replace the slot on every `topic`
    /// signal for the lifetime of this synchronizer
    pub fn bind<T, F>(&mut self, topic: Topic, fetch: F) -> Shared<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let slot = Arc::new(RwLock::new(fetch()));
        let view = Arc::clone(&slot);
        self.subscriptions
            .push(self.bus.subscribe(topic, move || {
                *view.write() = fetch();
            }));
        slot
    }
}

//! In-process publish/subscribe channel keyed by topic

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

type Handler = dyn Fn() + Send + Sync;

/// A named channel corresponding to one collection or UI signal.
///
/// Notifications carry no payload — only "something changed" — so
/// subscribers re-read the store rather than trust a delivered value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Users,
    Tasks,
    Recordings,
    Classifications,
    Messages,
    Auth,
    /// Ad-hoc UI signal (e.g. `member_status`)
    Signal(String),
}

impl Topic {
    pub fn signal(name: impl Into<String>) -> Topic {
        Topic::Signal(name.into())
    }
}

/// The five collection topics, in store-key order
pub fn entity_topics() -> [Topic; 5] {
    [
        Topic::Users,
        Topic::Tasks,
        Topic::Recordings,
        Topic::Classifications,
        Topic::Messages,
    ]
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Arc<Handler>)>>,
}

/// Synchronous, ordered pub/sub.
///
/// Handlers run in subscription order, outside the registry lock, so a
/// handler may publish or subscribe re-entrantly.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` for `topic`. Delivery stops when the returned
    /// [`Subscription`] is dropped or explicitly unsubscribed.
    pub fn subscribe(
        self: &Arc<Self>,
        topic: Topic,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .handlers
                .entry(topic.clone())
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };
        Subscription {
            bus: Arc::clone(self),
            topic,
            id,
        }
    }

    /// Invoke every handler subscribed to `topic`, in subscription order
    pub fn publish(&self, topic: &Topic) {
        let handlers: Vec<Arc<Handler>> = {
            let registry = self.registry.lock();
            registry
                .handlers
                .get(topic)
                .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        debug!("Publishing {:?} to {} subscriber(s)", topic, handlers.len());
        for handler in handlers {
            handler();
        }
    }

    fn unsubscribe(&self, topic: &Topic, id: u64) {
        let mut registry = self.registry.lock();
        if let Some(subs) = registry.handlers.get_mut(topic) {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}

/// Handle for one subscription; unsubscribes on drop
pub struct Subscription {
    bus: Arc<EventBus>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let _s1 = bus.subscribe(Topic::Tasks, move || o1.lock().push(1));
        let o2 = Arc::clone(&order);
        let _s2 = bus.subscribe(Topic::Tasks, move || o2.lock().push(2));

        bus.publish(&Topic::Tasks);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn test_topics_are_independent() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let _sub = bus.subscribe(Topic::Recordings, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Topic::Tasks);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.publish(&Topic::Recordings);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::Users, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Topic::Users);
        sub.unsubscribe();
        bus.publish(&Topic::Users);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        {
            let h = Arc::clone(&hits);
            let _sub = bus.subscribe(Topic::Messages, move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
            bus.publish(&Topic::Messages);
        }
        bus.publish(&Topic::Messages);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_reenter_bus() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::clone(&bus);
        let _outer = bus.subscribe(Topic::Tasks, move || {
            inner_bus.publish(&Topic::signal("refresh"));
        });
        let h = Arc::clone(&hits);
        let _inner = bus.subscribe(Topic::signal("refresh"), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Topic::Tasks);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(&Topic::Auth);
    }
}

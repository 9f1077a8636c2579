//! Typed publish/subscribe hub.
//!
//! RULES:
//!   - Delivery is synchronous, in subscription order.
//!   - Handlers see a snapshot of the subscriber list taken at publish
//!     time; the table lock is released before any handler runs, so a
//!     handler may subscribe, unsubscribe or call back into the engine.
//!   - A failing or panicking handler is logged and skipped. It never
//!     stops delivery to the handlers after it.
//!   - No buffering, no replay.

use crate::event::{Notification, Topic};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Handler = Arc<dyn Fn(&Notification) -> anyhow::Result<()> + Send + Sync>;

/// Returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<HashMap<Topic, Vec<(SubscriptionId, Handler)>>>,
    next_id:     AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        log::debug!("subscriber {id:?} added to {topic}");
        id
    }

    /// Returns false if `id` was not subscribed to `topic`.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(handlers) = subscribers.get_mut(&topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        before != handlers.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers.lock().get(&topic).map_or(0, Vec::len)
    }

    /// Deliver to every current subscriber of the notification's topic.
    /// Returns how many handlers completed without error.
    pub fn publish(&self, notification: &Notification) -> usize {
        let topic = notification.topic();
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscribers
            .lock()
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    log::warn!("{topic} subscriber {id:?} failed: {e:#}");
                }
                Err(_) => {
                    log::error!("{topic} subscriber {id:?} panicked; continuing delivery");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn started() -> Notification {
        Notification::MonitoringStarted { at: Utc::now() }
    }

    #[test]
    fn delivers_in_subscription_order() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            notifier.subscribe(Topic::MonitoringStarted, move |_| {
                seen.lock().push(n);
                Ok(())
            });
        }

        assert_eq!(notifier.publish(&started()), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn other_topics_not_delivered() {
        let notifier = Notifier::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        notifier.subscribe(Topic::MonitoringStopped, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        notifier.publish(&started());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_unknown_returns_false() {
        let notifier = Notifier::new();
        let id = notifier.subscribe(Topic::NewAlert, |_| Ok(()));
        assert!(!notifier.unsubscribe(Topic::AlertResolved, id));
        assert!(notifier.unsubscribe(Topic::NewAlert, id));
        assert!(!notifier.unsubscribe(Topic::NewAlert, id));
    }
}

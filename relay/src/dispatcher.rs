use crate::connection::SubscriberRegistry;
use async_trait::async_trait;
use events::{ChangeEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Outcome of one broadcast, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers in the snapshot the broadcast worked from.
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers each change event to every subscriber registered at broadcast time.
pub struct BroadcastDispatcher {
    registry: Arc<SubscriberRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast one event to all current subscribers - O(n) pushes, none blocking.
    ///
    /// A failed push is logged and skipped. The failing handle stays registered:
    /// its connection task observes the closure and removes it through the
    /// lifecycle's close path.
    pub fn broadcast(&self, event: &ChangeEvent) -> BroadcastReport {
        let subscribers = self.registry.snapshot();
        let payload = event.shared_payload();

        debug!(
            "Sending change event {} to {} subscriber(s)",
            event,
            subscribers.len()
        );

        let mut report = BroadcastReport {
            recipients: subscribers.len(),
            ..Default::default()
        };

        for subscriber in &subscribers {
            match subscriber.send(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to send change event to subscriber {}: {}",
                        subscriber.id(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[async_trait]
impl EventHandler for BroadcastDispatcher {
    async fn handle(&self, event: &ChangeEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SubscriberHandle;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn dispatcher() -> (Arc<SubscriberRegistry>, BroadcastDispatcher) {
        let registry = Arc::new(SubscriberRegistry::new());
        let dispatcher = BroadcastDispatcher::new(Arc::clone(&registry));
        (registry, dispatcher)
    }

    #[test]
    fn test_broadcast_with_no_subscribers() {
        let (_registry, dispatcher) = dispatcher();

        let report = dispatcher.broadcast(&ChangeEvent::new("{}"));

        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_insert_then_delete_after_one_subscriber_leaves() {
        let (registry, dispatcher) = dispatcher();
        let (s1, mut rx1) = SubscriberHandle::channel();
        let (s2, mut rx2) = SubscriberHandle::channel();
        registry.add(s1);
        registry.add(s2.clone());

        let insert = ChangeEvent::from_json(&json!({"op": "insert", "id": 42}));
        dispatcher.broadcast(&insert);

        assert_eq!(rx1.try_recv().unwrap().as_ref(), insert.payload());
        assert_eq!(rx2.try_recv().unwrap().as_ref(), insert.payload());
        assert!(rx1.try_recv().is_err(), "S1 should get exactly one message");
        assert!(rx2.try_recv().is_err(), "S2 should get exactly one message");

        registry.remove(s2.id());
        let delete = ChangeEvent::from_json(&json!({"op": "delete", "id": 42}));
        let report = dispatcher.broadcast(&delete);

        assert_eq!(report.recipients, 1);
        assert_eq!(rx1.try_recv().unwrap().as_ref(), delete.payload());
        assert!(rx2.try_recv().is_err(), "S2 left before the delete");
    }

    #[test]
    fn test_failed_send_does_not_block_other_subscribers() {
        let (registry, dispatcher) = dispatcher();
        let (gone, gone_rx) = SubscriberHandle::channel();
        let (alive, mut alive_rx) = SubscriberHandle::channel();
        registry.add(gone.clone());
        registry.add(alive);
        drop(gone_rx);

        let report = dispatcher.broadcast(&ChangeEvent::new("event"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(alive_rx.try_recv().unwrap().as_ref(), "event");
        assert!(
            registry.contains(gone.id()),
            "dispatcher must leave removal to the close path"
        );
    }

    #[test]
    fn test_events_arrive_in_order_under_concurrent_churn() {
        const EVENTS: usize = 500;
        const SUBSCRIBERS: usize = 5;

        let (registry, dispatcher) = dispatcher();
        let mut receivers = Vec::new();
        for _ in 0..SUBSCRIBERS {
            let (handle, rx) = SubscriberHandle::channel();
            registry.add(handle);
            receivers.push(rx);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let churn = {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let (handle, _rx) = SubscriberHandle::channel();
                    registry.add(handle.clone());
                    registry.remove(handle.id());
                }
            })
        };

        for i in 0..EVENTS {
            dispatcher.broadcast(&ChangeEvent::new(i.to_string()));
        }
        stop.store(true, Ordering::Relaxed);
        churn.join().unwrap();

        for rx in receivers.iter_mut() {
            for expected in 0..EVENTS {
                let payload = rx.try_recv().unwrap();
                assert_eq!(payload.as_ref(), expected.to_string());
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_event_handler_broadcasts() {
        let (registry, dispatcher) = dispatcher();
        let (handle, mut rx) = SubscriberHandle::channel();
        registry.add(handle);
        let handler: Arc<dyn EventHandler> = Arc::new(dispatcher);

        handler.handle(&ChangeEvent::new("payload")).await;

        assert_eq!(rx.recv().await.unwrap().as_ref(), "payload");
    }
}

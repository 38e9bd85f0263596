use crate::connection::{HandleId, Payload, SubscriberHandle, SubscriberRegistry};
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Hooks the WebSocket layer calls as connections open and close.
///
/// This is the only writer of the registry: a handle is added when its
/// handshake completes and removed when its connection ends.
#[derive(Clone)]
pub struct ConnectionLifecycle {
    registry: Arc<SubscriberRegistry>,
}

impl ConnectionLifecycle {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Create a handle for a connection that is about to open, plus the
    /// receiver its socket task drains.
    pub fn open_channel(&self) -> (SubscriberHandle, UnboundedReceiver<Payload>) {
        SubscriberHandle::channel()
    }

    /// Register a freshly opened connection. Later broadcasts include it.
    pub fn on_open(&self, handle: SubscriberHandle) {
        let id = handle.id().clone();
        if self.registry.add(handle) {
            info!(
                "Subscriber {} connected ({} active)",
                id,
                self.registry.len()
            );
        } else {
            debug!("Subscriber {id} was already registered");
        }
    }

    /// Deregister a connection on close or error. Safe to call for handles that
    /// were never registered or are already gone.
    pub fn on_close(&self, id: &HandleId) {
        if self.registry.remove(id) {
            info!(
                "Subscriber {} disconnected ({} active)",
                id,
                self.registry.len()
            );
        }
    }

    /// Every origin is accepted; there is no cross-origin restriction.
    pub fn accepts_origin(&self, origin: Option<&str>) -> bool {
        trace!("Accepting connection from origin {origin:?}");
        true
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }
}

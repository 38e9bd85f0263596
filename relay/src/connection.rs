use log::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};

/// Serialized change payload as pushed to a subscriber.
pub type Payload = Arc<str>;

/// Unique identifier for a subscriber connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleId(String);

impl HandleId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One live subscriber: its identity and the capability to push it a message.
///
/// The receiving half of the channel belongs to the connection's socket task,
/// which writes each payload to the peer. Pushing never blocks.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: HandleId,
    sender: UnboundedSender<Payload>,
}

impl SubscriberHandle {
    pub fn new(id: HandleId, sender: UnboundedSender<Payload>) -> Self {
        Self { id, sender }
    }

    /// Create a handle with a fresh id along with the receiver its socket task drains.
    pub fn channel() -> (Self, UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(HandleId::new(), tx), rx)
    }

    pub fn id(&self) -> &HandleId {
        &self.id
    }

    /// Queue a payload for delivery. Fails only once the connection task has gone away.
    pub fn send(&self, payload: Payload) -> Result<(), SendError<Payload>> {
        self.sender.send(payload)
    }
}

/// Set of currently open subscriber connections.
///
/// A single mutex guards the membership map and nothing else. It is never held
/// while a message is being delivered; broadcasters work from a `snapshot`.
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<HandleId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Add a subscriber. Returns `false` if the id was already present, in which
    /// case the existing handle is kept.
    pub fn add(&self, handle: SubscriberHandle) -> bool {
        let mut subscribers = self.lock();
        if subscribers.contains_key(handle.id()) {
            return false;
        }
        subscribers.insert(handle.id().clone(), handle);
        true
    }

    /// Remove a subscriber. Removing an unknown or already removed id is a no-op.
    pub fn remove(&self, id: &HandleId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if !removed {
            trace!("Subscriber {id} was not registered, nothing to remove");
        }
        removed
    }

    /// Copy of the current membership, taken at one consistent point.
    pub fn snapshot(&self) -> Vec<SubscriberHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: &HandleId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Every critical section leaves the map consistent, so a panic elsewhere
    // while the lock was held does not invalidate its contents.
    fn lock(&self) -> MutexGuard<'_, HashMap<HandleId, SubscriberHandle>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

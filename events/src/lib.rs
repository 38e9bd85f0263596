//! Change event types shared by the feed consumer and the relay.
//!
//! This crate sits between the producer of change events (`feed`) and the
//! consumers that deliver them (`relay`), so neither depends on the other.
//!
//! # Architecture
//!
//! - **ChangeEvent**: one row-level mutation as emitted by the database's change
//!   stream. The payload is kept as the exact text the database produced.
//! - **EventHandler**: trait implemented by anything that reacts to change events.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A single change emitted by the database's change stream.
///
/// The payload is opaque: it is never parsed or reformatted on its way to
/// subscribers. Cloning is cheap because the text is reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    payload: Arc<str>,
}

impl ChangeEvent {
    /// Wrap a raw payload exactly as received.
    pub fn new(payload: impl Into<Arc<str>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Build an event from a JSON value (tooling and tests).
    pub fn from_json(value: &Value) -> Self {
        Self::new(value.to_string())
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Returns a shared reference to the payload text, for fan-out without copying.
    pub fn shared_payload(&self) -> Arc<str> {
        Arc::clone(&self.payload)
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChangeEvent").field(&&*self.payload).finish()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

/// Trait for handling change events.
///
/// The change feed awaits `handle` for each event before fetching the next one,
/// so implementations see events in the order the database produced them.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChangeEvent);
}

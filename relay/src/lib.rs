//! Subscriber registry and broadcast fan-out for real-time change delivery.
//!
//! # Architecture
//!
//! - **SubscriberRegistry**: mutex-guarded map of open connections, keyed by a
//!   server-generated `HandleId`. Broadcasts work from a cloned snapshot so the
//!   lock is never held while sending.
//! - **BroadcastDispatcher**: pushes each change event to every handle in a
//!   snapshot. One failed push never affects the others.
//! - **ConnectionLifecycle**: open/close/origin hooks the WebSocket layer calls.
//!   It is the only writer of the registry.
//! - **Ephemeral messages**: events are not stored. A subscriber that connects
//!   after an event fired never sees it.
//!
//! # Message Flow
//!
//! 1. Client upgrades to WebSocket; the handler creates a handle and calls `on_open`
//! 2. The change feed hands each event to `BroadcastDispatcher::broadcast`
//! 3. The dispatcher snapshots the registry and queues the payload on each handle
//! 4. Each connection task drains its queue onto its socket
//! 5. When the socket closes or errors, the handler calls `on_close`
//!
//! # Modules
//!
//! - `connection`: SubscriberRegistry, SubscriberHandle and HandleId
//! - `dispatcher`: BroadcastDispatcher, the `events::EventHandler` that fans events out
//! - `lifecycle`: ConnectionLifecycle hooks

pub mod connection;
pub mod dispatcher;
pub mod lifecycle;

pub use connection::{HandleId, Payload, SubscriberHandle, SubscriberRegistry};
pub use dispatcher::{BroadcastDispatcher, BroadcastReport};
pub use lifecycle::ConnectionLifecycle;

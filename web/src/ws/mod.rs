//! WebSocket HTTP handler for the web layer.
//!
//! Only the Axum handler lives here. Registry, dispatch and lifecycle logic
//! live in the `relay` crate.

pub mod handler;

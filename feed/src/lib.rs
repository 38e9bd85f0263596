//! Reconnecting consumer of the database change stream.
//!
//! # Architecture
//!
//! - **ChangeFeed**: the connect → subscribe → stream loop. Every error at any
//!   step is logged and answered with a fresh connection after a backoff delay.
//! - **ChangeSource / FeedConnection**: the seam to the database driver.
//!   `PgChangeSource` implements it with PostgreSQL `LISTEN`/`NOTIFY`.
//! - **Backoff**: capped exponential delay between reconnection attempts, reset
//!   whenever the stream is re-established.
//!
//! Events are handed to an `events::EventHandler` one at a time, in the order the
//! stream produced them.

pub mod backoff;
pub mod consumer;
pub mod error;
pub mod postgres;
pub mod source;

pub use backoff::Backoff;
pub use consumer::{ChangeFeed, FeedState};
pub use error::{Error, ErrorKind};
pub use postgres::PgChangeSource;
pub use source::{ChangeSource, FeedConnection};

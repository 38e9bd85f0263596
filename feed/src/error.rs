//! Error types for the `feed` crate.
//!
//! Follows the same pattern as the other crates: a root `Error` struct holding an
//! `error_kind` tree and an optional `source` for chaining. The kind records the
//! phase of the feed cycle that failed; every kind is recovered the same way, by
//! reconnecting.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Phase of the feed cycle an error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening a database connection failed.
    Connect(ConnectErrorKind),
    /// The connection opened but the change stream subscription was rejected.
    Subscribe,
    /// The change stream failed or ended while streaming.
    Stream(StreamErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectErrorKind {
    Database,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamErrorKind {
    Fetch,
    Closed,
}

impl Error {
    pub fn new(error_kind: ErrorKind, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }

    pub fn connect(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Connect(ConnectErrorKind::Database), source)
    }

    pub fn connect_timeout(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Connect(ConnectErrorKind::Timeout), source)
    }

    pub fn subscribe(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Subscribe, source)
    }

    pub fn fetch(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Stream(StreamErrorKind::Fetch), source)
    }

    /// The stream ended without an error from the driver.
    pub fn stream_closed() -> Self {
        Self {
            source: None,
            error_kind: ErrorKind::Stream(StreamErrorKind::Closed),
        }
    }

    /// True for failures before the stream was established.
    pub fn is_connect_phase(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Connect(_) | ErrorKind::Subscribe
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let phase = match &self.error_kind {
            ErrorKind::Connect(ConnectErrorKind::Database) => "connect failed",
            ErrorKind::Connect(ConnectErrorKind::Timeout) => "connect timed out",
            ErrorKind::Subscribe => "subscribe failed",
            ErrorKind::Stream(StreamErrorKind::Fetch) => "fetch failed",
            ErrorKind::Stream(StreamErrorKind::Closed) => "stream closed",
        };
        match &self.source {
            Some(source) => write!(f, "Change feed {phase}: {source}"),
            None => write!(f, "Change feed {phase}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

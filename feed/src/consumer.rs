use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::source::{ChangeSource, FeedConnection};
use events::EventHandler;
use log::*;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Where the feed is in its connect/stream cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Streaming,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeedState::Disconnected => write!(f, "disconnected"),
            FeedState::Connecting => write!(f, "connecting"),
            FeedState::Streaming => write!(f, "streaming"),
        }
    }
}

/// Long-running consumer of the database change stream.
///
/// Connects, subscribes and hands every change to the handler, one at a time.
/// Any failure drops the connection and starts over from a fresh connection
/// after a backoff delay. Changes emitted while disconnected are not recovered.
pub struct ChangeFeed<S: ChangeSource> {
    source: S,
    handler: Arc<dyn EventHandler>,
    backoff: Backoff,
    state: FeedState,
}

impl<S: ChangeSource> ChangeFeed<S> {
    pub fn new(source: S, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            source,
            handler,
            backoff: Backoff::default(),
            state: FeedState::Disconnected,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Consume the change stream until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Change feed shutting down");
                    return;
                }
                _ = self.run_cycle() => {}
            }
        }
    }

    /// One full connect/subscribe/stream cycle, ending in `Disconnected`
    /// after the backoff delay.
    async fn run_cycle(&mut self) {
        let err = match self.connect_and_stream().await {
            Ok(never) => match never {},
            Err(err) => err,
        };

        self.transition(FeedState::Disconnected);
        if err.is_connect_phase() {
            warn!("Change feed not established, will retry: {}", describe(&err));
        } else {
            error!("Change feed lost while streaming: {}", describe(&err));
        }

        let delay = self.backoff.next_delay();
        if !delay.is_zero() {
            info!("Reconnecting change feed in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&mut self) -> Result<Infallible> {
        self.transition(FeedState::Connecting);
        let mut connection = self.source.connect().await?;
        connection.subscribe().await?;

        self.transition(FeedState::Streaming);
        self.backoff.reset();

        loop {
            match connection.next_change().await? {
                Some(event) => {
                    trace!("Received change event {event}");
                    self.handler.handle(&event).await;
                }
                None => return Err(Error::stream_closed()),
            }
        }
    }

    fn transition(&mut self, next: FeedState) {
        if self.state != next {
            debug!("Change feed {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

// Renders the error along with its full source chain.
fn describe(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source().and_then(|cause| cause.source());
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

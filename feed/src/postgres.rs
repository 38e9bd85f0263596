//! PostgreSQL change source built on `LISTEN`/`NOTIFY`.
//!
//! A row trigger on the watched table publishes every INSERT, UPDATE and DELETE
//! with `pg_notify`. This module listens on that channel and turns each
//! notification payload into a `ChangeEvent`, untouched.

use crate::error::{Error, Result};
use crate::source::{ChangeSource, FeedConnection};
use async_trait::async_trait;
use events::ChangeEvent;
use log::*;
use sqlx::postgres::PgListener;
use std::time::Duration;

pub struct PgChangeSource {
    database_url: String,
    channel: String,
    connect_timeout: Duration,
}

impl PgChangeSource {
    pub fn new(database_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            channel: channel.into(),
            connect_timeout: Duration::from_secs(8),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl ChangeSource for PgChangeSource {
    type Connection = PgFeedConnection;

    async fn connect(&self) -> Result<PgFeedConnection> {
        let mut listener = tokio::time::timeout(
            self.connect_timeout,
            PgListener::connect(&self.database_url),
        )
        .await
        .map_err(Error::connect_timeout)?
        .map_err(Error::connect)?;
        // A lost connection must surface as the end of the stream. Reconnecting
        // belongs to the feed loop, with its timeout, backoff and logging.
        listener.eager_reconnect(false);

        debug!("Opened change feed connection");

        Ok(PgFeedConnection {
            listener,
            channel: self.channel.clone(),
        })
    }
}

pub struct PgFeedConnection {
    listener: PgListener,
    channel: String,
}

#[async_trait]
impl FeedConnection for PgFeedConnection {
    async fn subscribe(&mut self) -> Result<()> {
        self.listener
            .listen(&self.channel)
            .await
            .map_err(Error::subscribe)?;

        debug!("Listening for changes on channel {}", self.channel);
        Ok(())
    }

    async fn next_change(&mut self) -> Result<Option<ChangeEvent>> {
        // `None` means the connection was lost. The listener is not reused
        // afterwards; another `try_recv` would quietly reconnect.
        match self.listener.try_recv().await {
            Ok(Some(notification)) => Ok(Some(ChangeEvent::new(notification.payload()))),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::fetch(e)),
        }
    }
}

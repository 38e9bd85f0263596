use crate::error::Result;
use async_trait::async_trait;
use events::ChangeEvent;

/// Something the change feed can open connections to.
///
/// Each call to `connect` must produce a logically fresh connection; nothing is
/// carried over from a previous one.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    type Connection: FeedConnection;

    async fn connect(&self) -> Result<Self::Connection>;
}

/// One open connection to the database's change stream.
#[async_trait]
pub trait FeedConnection: Send {
    /// Start receiving changes for the watched table.
    async fn subscribe(&mut self) -> Result<()>;

    /// Wait for the next change. `Ok(None)` means the stream ended and the
    /// connection is no longer usable.
    async fn next_change(&mut self) -> Result<Option<ChangeEvent>>;
}

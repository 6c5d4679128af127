//! Publisher traits.

use crate::PublishResult;
use async_trait::async_trait;

/// Opens sessions towards the broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Open a session. Failures here are always session-level.
    async fn open(&self) -> PublishResult<Box<dyn PublisherSession>>;
}

/// A live session. Used by one batch, then closed.
#[async_trait]
pub trait PublisherSession: Send {
    /// Publish one serialized record.
    async fn publish_one(&mut self, payload: &[u8]) -> PublishResult<()>;

    /// Release the session. Called on every exit path of a batch.
    async fn close(&mut self) -> PublishResult<()>;
}

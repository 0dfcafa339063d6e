//! Transport seam under the bus facade.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Moves encoded envelopes between publishers and subscribers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs (`inproc`, `amqp`).
    fn name(&self) -> &'static str;

    /// Publish `body` with routing key `topic`. Best effort.
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()>;

    /// Receive bodies whose topic matches `pattern` (`*` and `#` wildcards).
    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Flush what can be flushed and release connections.
    async fn close(&self);
}

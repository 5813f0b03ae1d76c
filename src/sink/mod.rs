pub mod discord_channel;

use crate::error::SinkError;
use async_trait::async_trait;

/// Destination accepting one formatted message at a time.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn post_message(&self, text: &str) -> Result<(), SinkError>;

    /// Longest message (in characters) the sink accepts.
    fn max_message_chars(&self) -> usize;

    fn name(&self) -> String;
}

use super::Sink;
use crate::discord::rest::DiscordRest;
use crate::discord::types::MAX_CONTENT_CHARS;
use crate::error::SinkError;
use async_trait::async_trait;
use std::sync::Arc;

/// Posts into a single Discord text channel.
pub struct DiscordChannelSink {
    rest: Arc<DiscordRest>,
    channel_id: String,
}

impl DiscordChannelSink {
    pub fn new(rest: Arc<DiscordRest>, channel_id: &str) -> Self {
        Self {
            rest,
            channel_id: channel_id.to_string(),
        }
    }
}

#[async_trait]
impl Sink for DiscordChannelSink {
    async fn post_message(&self, text: &str) -> Result<(), SinkError> {
        let created = self.rest.create_message(&self.channel_id, text).await?;
        if let Some(message) = created {
            tracing::debug!(channel_id = %self.channel_id, message_id = %message.id, "message posted");
        }
        Ok(())
    }

    fn max_message_chars(&self) -> usize {
        MAX_CONTENT_CHARS
    }

    fn name(&self) -> String {
        format!("discord-channel:{}", self.channel_id)
    }
}

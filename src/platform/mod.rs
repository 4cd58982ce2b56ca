pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error};

/// A text message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    /// Used as the reply-to target
    pub message_id: i32,
    pub text: String,
}

/// Outbound side of a chat platform.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send `text` to `chat_id` as a reply to message `reply_to`.
    async fn send_reply(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()>;
}

/// Send a threaded reply. Empty text sends nothing; failures are only logged.
pub async fn dispatch_reply(sink: &dyn ReplySink, chat_id: i64, message_id: i32, text: &str) {
    if text.is_empty() {
        debug!("Nothing to reply to message {} in chat {}", message_id, chat_id);
        return;
    }

    if let Err(e) = sink.send_reply(chat_id, message_id, text).await {
        error!(
            "Failed to send reply to message {} in chat {}: {:#}",
            message_id, chat_id, e
        );
    }
}

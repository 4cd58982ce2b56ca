use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, MessageId, ReplyParameters};
use tracing::{debug, info, warn};

use crate::platform::{InboundMessage, ReplySink};
use crate::relay::Relay;

#[async_trait]
impl ReplySink for Bot {
    async fn send_reply(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()> {
        self.send_message(ChatId(chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(reply_to)))
            .await
            .context("Telegram sendMessage failed")?;
        Ok(())
    }
}

/// Every update maps to the same key, so the dispatcher runs them one at a
/// time in arrival order.
fn single_queue(_update: &Update) -> Option<()> {
    Some(())
}

fn command_menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("topic", "Writing prompt about a topic"),
        BotCommand::new("phrase", "Writing prompt built around a phrase"),
        BotCommand::new("anything", "Ask any question"),
    ]
}

/// The bot's own username, used to recognize `/command@username` in groups.
#[derive(Debug, Clone, Default)]
struct BotUsername(String);

/// Rewrite `/command@username rest` to `/command rest` when the mention is
/// addressed to this bot. Any other text is returned unchanged.
fn strip_mention(text: &str, username: &BotUsername) -> String {
    if username.0.is_empty() {
        return text.to_string();
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (word, rest) = text.split_at(end);
    match word.split_once('@') {
        Some((command, mention))
            if command.starts_with('/') && mention.eq_ignore_ascii_case(&username.0) =>
        {
            format!("{}{}", command, rest)
        }
        _ => text.to_string(),
    }
}

/// Convert a Telegram message into the platform-agnostic form.
/// Messages without text yield None.
fn inbound_from(msg: &Message, username: &BotUsername) -> Option<InboundMessage> {
    Some(InboundMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: strip_mention(msg.text()?, username),
    })
}

/// Authorize with Telegram and run the update loop until it is stopped.
pub async fn run(relay: Arc<Relay>, bot: Bot) -> Result<()> {
    let me = bot
        .get_me()
        .await
        .context("Failed to authorize with Telegram")?;
    let username = BotUsername(me.user.username.clone().unwrap_or_default());
    info!("Authorized on account {}", username.0);

    if let Err(e) = bot.set_my_commands(command_menu()).await {
        warn!("Failed to register command menu: {}", e);
    }

    info!("Starting Telegram update loop...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay, username])
        .distribution_function(single_queue)
        .default_handler(|upd| async move {
            debug!("Ignoring update without message: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Update loop stopped");
    Ok(())
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    relay: Arc<Relay>,
    username: BotUsername,
) -> ResponseResult<()> {
    let Some(incoming) = inbound_from(&msg, &username) else {
        return Ok(());
    };

    relay.handle(&incoming, &bot).await;
    Ok(())
}

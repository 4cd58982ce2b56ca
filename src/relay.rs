use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::command::Command;
use crate::config::Config;
use crate::llm::Completer;
use crate::platform::{dispatch_reply, InboundMessage, ReplySink};
use crate::prompt;

/// Reply for a recognized command sent without an argument
pub const GUIDANCE_REPLY: &str = "Please, enter your topic or phrase";

/// The per-message pipeline: parse, build prompt, complete, reply.
/// Platform-agnostic: receives an InboundMessage, returns response text.
pub struct Relay {
    config: Arc<Config>,
    completer: Arc<dyn Completer>,
}

impl Relay {
    pub fn new(config: Arc<Config>, completer: Arc<dyn Completer>) -> Self {
        Self { config, completer }
    }

    /// Compute the reply for a message. None means the message gets no reply.
    pub async fn process_message(&self, incoming: &InboundMessage) -> Option<String> {
        let command = Command::parse(&incoming.text);
        let Some(argument) = command.argument() else {
            trace!("Ignoring non-command message {}", incoming.message_id);
            return None;
        };

        info!(
            "/{} from chat {} (message {})",
            command.name(),
            incoming.chat_id,
            incoming.message_id
        );

        if argument.is_empty() {
            return Some(GUIDANCE_REPLY.to_string());
        }

        let prompt = prompt::build(&command, &self.config.settings)?;
        debug!("Prompt: {}", prompt);

        Some(self.completer.complete_or_fallback(&prompt).await)
    }

    /// Process a message and send the reply, if any, back through `sink`.
    pub async fn handle(&self, incoming: &InboundMessage, sink: &dyn ReplySink) {
        if let Some(reply) = self.process_message(incoming).await {
            dispatch_reply(sink, incoming.chat_id, incoming.message_id, &reply).await;
        }
    }
}

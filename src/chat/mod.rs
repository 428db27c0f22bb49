//! Chat completion for grounded conversations.
//!
//! The gateway trait hides the completion backend; [`ModelsChatGateway`]
//! talks to an OpenAI-compatible `/chat/completions` endpoint.

mod models;

pub use models::ModelsChatGateway;

use async_trait::async_trait;
use serde::Serialize;

use crate::conversation::{Message, Role};
use crate::error::ChatError;

/// Produces the assistant reply for one turn.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Complete a turn. `history` ends with the pending user message and is
    /// never mutated here.
    async fn complete(&self, system_prompt: &str, history: &[Message]) -> Result<Message, ChatError>;
}

/// Wire form of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// Request messages for a turn: the system prompt first, then history.
///
/// System entries already present in `history` are dropped so the system
/// message appears exactly once.
pub fn build_messages<'a>(system_prompt: &'a str, history: &'a [Message]) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage {
        role: Role::System,
        content: system_prompt,
    });
    messages.extend(
        history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ChatMessage {
                role: m.role,
                content: &m.content,
            }),
    );
    messages
}

/// The most recent `limit` messages of `history`.
///
/// The window is widened forward until it starts on a user message, so a
/// reply is never sent without the question it answers. A `limit` of zero
/// disables windowing.
pub fn recent_window(history: &[Message], limit: usize) -> &[Message] {
    if limit == 0 || history.len() <= limit {
        return history;
    }
    let mut start = history.len() - limit;
    while start + 1 < history.len() && history[start].role != Role::User {
        start += 1;
    }
    &history[start..]
}

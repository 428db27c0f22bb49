//! Conversations — per-conversation history and cached grounding context.

pub mod model;
pub mod store;

pub use model::{Conversation, Message, Role};
pub use store::{ConversationStore, Turn};

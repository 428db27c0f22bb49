//! Conversation data model.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};

use crate::spaces::{Space, SpaceContext};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A server-held conversation bound to exactly one space.
///
/// Only [`ConversationStore`](super::ConversationStore) creates these; the
/// context cell and history lock are driven through the store.
#[derive(Debug)]
pub struct Conversation {
    pub(super) id: String,
    pub(super) space: Space,
    pub(super) context: OnceCell<Arc<SpaceContext>>,
    pub(super) fetching: AtomicBool,
    pub(super) history: Arc<Mutex<Vec<Message>>>,
    pub(super) created_at: DateTime<Utc>,
}

impl Conversation {
    pub(super) fn new(id: String, space: Space) -> Self {
        Self {
            id,
            space,
            context: OnceCell::new(),
            fetching: AtomicBool::new(false),
            history: Arc::new(Mutex::new(Vec::new())),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn space_ref(&self) -> &str {
        &self.space.space_ref
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The grounding context, if it has been fetched.
    pub fn context(&self) -> Option<Arc<SpaceContext>> {
        self.context.get().cloned()
    }

    /// Whether a context fetch is currently in flight.
    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::SeqCst)
    }

    /// Snapshot of the history. Waits for any in-flight turn to finish.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }
}

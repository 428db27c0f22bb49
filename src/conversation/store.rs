//! Conversation store — in-memory conversations keyed by id.
//!
//! The map itself is behind one `RwLock`, held only for lookups and inserts.
//! Everything per-conversation lives on the entry: the context cell admits a
//! single loader at a time, and the history mutex serializes turns. Distinct
//! conversations never contend past the map lookup.
//!
//! Nothing here bounds the number of conversations or their history length.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{Conversation, Message};
use crate::error::{ConversationError, ProtocolError};
use crate::spaces::{ContextSource, Space, SpaceContext};

/// Owner of every conversation in the process.
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Arc<Conversation>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Look up `id` or start a new conversation for `space`.
    ///
    /// An absent id, or one this process has never issued, starts a fresh
    /// conversation with a new id. A known id bound to a different space is
    /// rejected; the existing conversation is left untouched.
    pub async fn get_or_create(
        &self,
        id: Option<&str>,
        space: &Space,
    ) -> Result<Arc<Conversation>, ConversationError> {
        if let Some(id) = id {
            if let Some(existing) = self.conversations.read().await.get(id) {
                return check_space(existing, space);
            }
            debug!(conversation_id = %id, "Unknown conversation id, starting a new conversation");
        }

        let conversation = Arc::new(Conversation::new(Uuid::new_v4().to_string(), space.clone()));
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), Arc::clone(&conversation));

        info!(
            conversation_id = %conversation.id,
            space_ref = %space.space_ref,
            "Conversation created"
        );
        Ok(conversation)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Conversation>> {
        self.conversations.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    /// Return the conversation's context, loading it on first use.
    ///
    /// At most one `source.load` runs per conversation at a time; concurrent
    /// callers wait for it and share its result. A failed load leaves the
    /// cell empty so a later call can try again.
    pub async fn ensure_context(
        &self,
        conversation: &Conversation,
        source: &dyn ContextSource,
    ) -> Result<Arc<SpaceContext>, ProtocolError> {
        let context = conversation
            .context
            .get_or_try_init(|| async {
                let _fetching = FetchFlag::raise(conversation);
                debug!(conversation_id = %conversation.id, "Fetching space context");
                source.load(&conversation.space).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(context))
    }

    /// Start a turn, waiting for any in-flight turn on the same conversation.
    ///
    /// Messages appended through the returned [`Turn`] are rolled back on
    /// drop unless the turn is committed.
    pub async fn begin_turn(&self, conversation: &Conversation) -> Turn {
        let history = Arc::clone(&conversation.history).lock_owned().await;
        Turn {
            conversation_id: conversation.id.clone(),
            committed_len: history.len(),
            history,
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_space(existing: &Arc<Conversation>, space: &Space) -> Result<Arc<Conversation>, ConversationError> {
    if existing.space.space_ref != space.space_ref {
        return Err(ConversationError::Mismatch {
            id: existing.id.clone(),
            existing: existing.space.space_ref.clone(),
            requested: space.space_ref.clone(),
        });
    }
    Ok(Arc::clone(existing))
}

/// Marks a conversation as fetching for the lifetime of the guard.
struct FetchFlag<'a>(&'a Conversation);

impl<'a> FetchFlag<'a> {
    fn raise(conversation: &'a Conversation) -> Self {
        conversation.fetching.store(true, Ordering::SeqCst);
        Self(conversation)
    }
}

impl Drop for FetchFlag<'_> {
    fn drop(&mut self) {
        self.0.fetching.store(false, Ordering::SeqCst);
    }
}

/// Exclusive access to one conversation's history for the span of a turn.
pub struct Turn {
    conversation_id: String,
    history: OwnedMutexGuard<Vec<Message>>,
    committed_len: usize,
}

impl Turn {
    /// Append a message and return the full history including it.
    pub fn append_turn(&mut self, mut message: Message) -> &[Message] {
        if let Some(last) = self.history.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.history.push(message);
        &self.history
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Keep everything appended so far.
    pub fn commit(mut self) {
        self.committed_len = self.history.len();
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if self.history.len() > self.committed_len {
            warn!(
                conversation_id = %self.conversation_id,
                dropped = self.history.len() - self.committed_len,
                "Rolling back uncommitted turn"
            );
            self.history.truncate(self.committed_len);
        }
    }
}

//! Space bridge — ties the catalog, context loading, conversations and chat
//! into the three operations the HTTP surface exposes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use crate::chat::{ChatGateway, recent_window};
use crate::conversation::{ConversationStore, Message};
use crate::error::{CatalogError, Error, ProtocolError, Result};
use crate::retry::{RetryPolicy, with_backoff};
use crate::spaces::{ContextSource, Space, SpaceCatalog, SpaceContext};

/// Collaborators the bridge drives.
pub struct BridgeDeps {
    pub catalog: Arc<SpaceCatalog>,
    pub loader: Arc<dyn ContextSource>,
    pub store: Arc<ConversationStore>,
    pub chat: Arc<dyn ChatGateway>,
}

/// Per-file summary returned with a space's details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub chars: usize,
}

/// A space together with the context built from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceDetail {
    pub space_ref: String,
    pub owner_login: String,
    pub name: String,
    pub display_name: String,
    pub files: Vec<FileSummary>,
    pub context: String,
}

impl SpaceDetail {
    fn new(space: &Space, context: &SpaceContext) -> Self {
        Self {
            space_ref: space.space_ref.clone(),
            owner_login: space.owner_login.clone(),
            name: space.name.clone(),
            display_name: context.display_name.clone(),
            files: context
                .files
                .iter()
                .map(|f| FileSummary {
                    path: f.path.clone(),
                    chars: f.text.chars().count(),
                })
                .collect(),
            context: context.system_prompt.clone(),
        }
    }
}

/// Result of one grounded turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub conversation_id: String,
    pub response: String,
    pub space_ref: String,
}

/// Context source that retries transient load failures.
struct RetryingSource {
    inner: Arc<dyn ContextSource>,
    policy: RetryPolicy,
}

#[async_trait]
impl ContextSource for RetryingSource {
    async fn load(&self, space: &Space) -> std::result::Result<SpaceContext, ProtocolError> {
        with_backoff(self.policy, "load_context", || self.inner.load(space)).await
    }
}

pub struct SpaceBridge {
    catalog: Arc<SpaceCatalog>,
    loader: RetryingSource,
    store: Arc<ConversationStore>,
    chat: Arc<dyn ChatGateway>,
    retry: RetryPolicy,
    history_window: usize,
}

impl SpaceBridge {
    pub fn new(deps: BridgeDeps, retry: RetryPolicy, history_window: usize) -> Self {
        Self {
            catalog: deps.catalog,
            loader: RetryingSource {
                inner: deps.loader,
                policy: retry,
            },
            store: deps.store,
            chat: deps.chat,
            retry,
            history_window,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// Spaces visible to the configured credential.
    pub async fn list_spaces(&self) -> Result<Vec<Space>> {
        let spaces = with_backoff(self.retry, "list_spaces", || self.catalog.list()).await?;
        Ok(spaces)
    }

    /// Details and freshly built context for one space.
    #[instrument(skip(self))]
    pub async fn space_detail(&self, owner: &str, name: &str) -> Result<SpaceDetail> {
        let space = self.resolve_space(owner, name).await?;
        let context = self.loader.load(&space).await?;
        Ok(SpaceDetail::new(&space, &context))
    }

    /// Run one grounded turn.
    ///
    /// The user message is only kept if the chat call succeeds; a failed
    /// turn leaves the conversation's history as it was.
    #[instrument(skip(self, prompt), fields(prompt_chars = prompt.len()))]
    pub async fn query(
        &self,
        owner: &str,
        name: &str,
        conversation_id: Option<&str>,
        prompt: &str,
    ) -> Result<QueryOutcome> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::InvalidRequest("prompt must not be empty".to_string()));
        }

        let space = self.resolve_space(owner, name).await?;
        let conversation = self.store.get_or_create(conversation_id, &space).await?;
        let context = self.store.ensure_context(&conversation, &self.loader).await?;

        let mut turn = self.store.begin_turn(&conversation).await;
        let history = turn.append_turn(Message::user(prompt));
        let window = recent_window(history, self.history_window);
        let system_prompt = context.system_prompt.as_str();
        let chat = &self.chat;

        let reply = with_backoff(self.retry, "chat_completion", || chat.complete(system_prompt, window)).await?;
        let response = reply.content.clone();
        turn.append_turn(reply);
        turn.commit();

        info!(
            conversation_id = %conversation.id(),
            space_ref = %space.space_ref,
            model = %self.chat.model_name(),
            "Turn completed"
        );
        Ok(QueryOutcome {
            conversation_id: conversation.id().to_string(),
            response,
            space_ref: space.space_ref,
        })
    }

    /// Resolve against the last listing, re-listing once on a miss.
    async fn resolve_space(&self, owner: &str, name: &str) -> Result<Space> {
        match self.catalog.resolve(owner, name).await {
            Ok(space) => Ok(space),
            Err(CatalogError::SpaceNotFound { .. }) => {
                self.list_spaces().await?;
                Ok(self.catalog.resolve(owner, name).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

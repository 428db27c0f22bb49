//! Context loader — builds the grounding document for a space.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::catalog::Space;
use crate::error::ProtocolError;
use crate::protocol::{ContentItem, ContentKind, ProtocolAdapter};

/// Placeholder used when a space has no linked files.
pub const NO_FILES_PLACEHOLDER: &str = "(No knowledge files are attached to this space yet.)";

const FILE_SEPARATOR: &str = "\n\n---\n\n";

/// A file body linked to a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpaceFile {
    pub path: String,
    pub text: String,
}

/// Grounding context for one conversation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceContext {
    pub space_ref: String,
    /// Name reported by the space itself; falls back to the path name.
    pub display_name: String,
    pub system_prompt: String,
    pub files: Vec<SpaceFile>,
    pub fetched_at: DateTime<Utc>,
}

impl SpaceContext {
    /// Whether the space contributed any file content.
    pub fn is_grounded(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Anything that can produce a [`SpaceContext`] for a space.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn load(&self, space: &Space) -> Result<SpaceContext, ProtocolError>;
}

/// Loads space contents through the protocol adapter.
pub struct ContextLoader {
    adapter: Arc<ProtocolAdapter>,
    get_tool: String,
}

impl ContextLoader {
    pub fn new(adapter: Arc<ProtocolAdapter>, get_tool: impl Into<String>) -> Self {
        Self {
            adapter,
            get_tool: get_tool.into(),
        }
    }
}

#[async_trait]
impl ContextSource for ContextLoader {
    async fn load(&self, space: &Space) -> Result<SpaceContext, ProtocolError> {
        let items = self
            .adapter
            .invoke(
                &self.get_tool,
                json!({"owner": space.owner_login, "name": space.name}),
            )
            .await?;

        let context = build_context(space, &items);
        info!(
            space_ref = %space.space_ref,
            files = context.files.len(),
            chars = context.system_prompt.len(),
            "Loaded space context"
        );
        Ok(context)
    }
}

/// Build the grounding context from ordered content items.
///
/// File records are kept in the order received; blank files, name records
/// and unclassified items contribute nothing to the prompt.
pub fn build_context(space: &Space, items: &[ContentItem]) -> SpaceContext {
    let mut display_name = None;
    let mut files = Vec::new();

    for item in items {
        match &item.kind {
            ContentKind::NameRecord => {
                let reported = item.text.trim();
                if display_name.is_none() && !reported.is_empty() {
                    display_name = Some(reported.to_string());
                }
            }
            ContentKind::FileRecord { path } => {
                if item.text.trim().is_empty() {
                    debug!(path = %path, "Skipping empty file");
                    continue;
                }
                files.push(SpaceFile {
                    path: path.clone(),
                    text: item.text.clone(),
                });
            }
            ContentKind::Unclassified => {
                debug!(uri = %item.uri, "Ignoring unclassified content item");
            }
        }
    }

    let system_prompt = system_prompt_for(space, &files);
    SpaceContext {
        space_ref: space.space_ref.clone(),
        display_name: display_name.unwrap_or_else(|| space.name.clone()),
        system_prompt,
        files,
        fetched_at: Utc::now(),
    }
}

fn system_prompt_for(space: &Space, files: &[SpaceFile]) -> String {
    let mut prompt = format!(
        "You are an assistant answering questions about the '{}' space (owner: {}). \
         Use only the knowledge files below as your source. \
         If they do not contain the answer, say so plainly.\n\n",
        space.name, space.owner_login
    );

    if files.is_empty() {
        prompt.push_str(NO_FILES_PLACEHOLDER);
        return prompt;
    }

    prompt.push_str("## Space Knowledge Files\n\n");
    let sections: Vec<String> = files
        .iter()
        .map(|file| format!("### File: {}\n\n{}", file.path, file.text))
        .collect();
    prompt.push_str(&sections.join(FILE_SEPARATOR));
    prompt
}

//! Content items returned by tool calls.
//!
//! The tool server returns each item in one of two shapes:
//!
//! ```text
//! { "type": "resource", "resource": { "uri": ..., "mimeType": ..., "text": ... } }
//! { "type": "text", "text": ... }
//! ```
//!
//! `normalize_items` folds both into a single [`ContentItem`]. Nothing above
//! the protocol module sees the raw shapes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

static NAME_RECORD_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^space://[^/]+/[^/]+/contents/name$").expect("valid regex"));

static FILE_RECORD_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^space://[^/]+/[^/]+/files/(.+)$").expect("valid regex"));

/// What a content item represents, derived from its URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentKind {
    /// `space://{owner}/{id}/contents/name`: the space's display name.
    NameRecord,
    /// `space://{owner}/{id}/files/{path}`: a linked file body.
    FileRecord { path: String },
    /// Anything else. Not an error, just not part of the grounding context.
    Unclassified,
}

impl ContentKind {
    pub fn classify(uri: &str) -> Self {
        if NAME_RECORD_URI.is_match(uri) {
            return Self::NameRecord;
        }
        match FILE_RECORD_URI.captures(uri) {
            Some(caps) => Self::FileRecord {
                path: caps[1].to_string(),
            },
            None => Self::Unclassified,
        }
    }
}

/// A normalized content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
    pub kind: ContentKind,
}

impl ContentItem {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        let uri = uri.into();
        let kind = ContentKind::classify(&uri);
        Self {
            uri,
            mime_type: mime_type.into(),
            text: text.into(),
            kind,
        }
    }
}

// ── Wire shapes ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default, rename = "type")]
    content_type: Option<String>,
    #[serde(default)]
    resource: Option<RawResource>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Which of the two payload shapes an item carries.
enum Shape {
    Embedded(RawResource),
    Flat {
        uri: Option<String>,
        mime_type: Option<String>,
        text: String,
    },
}

impl RawContent {
    /// Nested form is probed first; the flat form is the fallback.
    fn shape(self) -> Option<Shape> {
        if let Some(resource) = self.resource {
            if resource.text.is_some() {
                return Some(Shape::Embedded(resource));
            }
        }
        self.text.map(|text| Shape::Flat {
            uri: self.uri,
            mime_type: self.mime_type,
            text,
        })
    }
}

impl Shape {
    fn into_item(self) -> ContentItem {
        match self {
            Shape::Embedded(resource) => ContentItem::new(
                resource.uri.unwrap_or_default(),
                resource.mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                resource.text.unwrap_or_default(),
            ),
            Shape::Flat {
                uri,
                mime_type,
                text,
            } => ContentItem::new(
                uri.unwrap_or_default(),
                mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                text,
            ),
        }
    }
}

/// Normalize the `content` array of a tool result.
///
/// Items carrying neither shape are skipped with a warning; they never fail
/// the whole call.
pub fn normalize_items(raw: &[Value]) -> Vec<ContentItem> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let parsed: RawContent = match serde_json::from_value(value.clone()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(index, error = %e, "Skipping unparsable content item");
                    return None;
                }
            };
            let content_type = parsed.content_type.clone();
            match parsed.shape() {
                Some(shape) => Some(shape.into_item()),
                None => {
                    warn!(
                        index,
                        content_type = content_type.as_deref().unwrap_or("<none>"),
                        "Skipping content item with no text payload"
                    );
                    None
                }
            }
        })
        .collect()
}

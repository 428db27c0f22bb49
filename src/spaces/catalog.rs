//! Space catalog — lists spaces and resolves `owner/name` pairs.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::protocol::{ContentItem, ProtocolAdapter};

/// Fields that may carry a space's owner, in priority order.
///
/// `ownerLogin` is canonical; the others are accepted for compatibility with
/// older tool-server payloads. An `owner` object contributes its `login`.
pub const OWNER_FIELD_ALIASES: &[&str] = &["ownerLogin", "owner_login", "owner"];

/// Keys under which a listing payload may wrap its record array.
const LIST_WRAPPER_KEYS: &[&str] = &["spaces", "items"];

/// An owner-scoped remote space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub owner_login: String,
    pub name: String,
    /// `owner_login/name`, the stable external identifier.
    pub space_ref: String,
}

impl Space {
    /// Build a space, rejecting empty or slash-containing parts.
    pub fn new(owner_login: &str, name: &str) -> Result<Self, CatalogError> {
        let owner_login = owner_login.trim();
        let name = name.trim();
        if owner_login.is_empty() {
            return Err(CatalogError::InvalidSpace {
                reason: "owner is empty".to_string(),
            });
        }
        if name.is_empty() {
            return Err(CatalogError::InvalidSpace {
                reason: "name is empty".to_string(),
            });
        }
        if owner_login.contains('/') || name.contains('/') {
            return Err(CatalogError::InvalidSpace {
                reason: format!("'{owner_login}' / '{name}' must not contain '/'"),
            });
        }
        Ok(Self {
            owner_login: owner_login.to_string(),
            name: name.to_string(),
            space_ref: format!("{owner_login}/{name}"),
        })
    }

    /// Parse an `owner/name` reference.
    pub fn from_ref(space_ref: &str) -> Result<Self, CatalogError> {
        match space_ref.split_once('/') {
            Some((owner, name)) => Self::new(owner, name),
            None => Err(CatalogError::InvalidSpace {
                reason: format!("'{space_ref}' is not of the form owner/name"),
            }),
        }
    }
}

/// Lists available spaces through the protocol adapter and remembers the
/// last listing for [`SpaceCatalog::resolve`].
pub struct SpaceCatalog {
    adapter: Arc<ProtocolAdapter>,
    list_tool: String,
    last_listed: RwLock<Vec<Space>>,
}

impl SpaceCatalog {
    pub fn new(adapter: Arc<ProtocolAdapter>, list_tool: impl Into<String>) -> Self {
        Self {
            adapter,
            list_tool: list_tool.into(),
            last_listed: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the current listing. Records without a usable owner or name are
    /// dropped.
    pub async fn list(&self) -> Result<Vec<Space>, CatalogError> {
        let items = self.adapter.invoke(&self.list_tool, json!({})).await?;
        let spaces = spaces_from_items(&items);

        info!(count = spaces.len(), "Listed spaces");
        *self.last_listed.write().await = spaces.clone();
        Ok(spaces)
    }

    /// Resolve an `owner/name` pair against the last listing. Does not touch
    /// the network; callers re-list when this reports `SpaceNotFound`.
    pub async fn resolve(&self, owner_login: &str, name: &str) -> Result<Space, CatalogError> {
        let wanted = Space::new(owner_login, name)?;
        let listed = self.last_listed.read().await;
        listed
            .iter()
            .find(|space| *space == &wanted)
            .cloned()
            .ok_or(CatalogError::SpaceNotFound {
                space_ref: wanted.space_ref,
            })
    }

    /// The spaces seen in the most recent successful listing.
    pub async fn last_listed(&self) -> Vec<Space> {
        self.last_listed.read().await.clone()
    }
}

/// Extract spaces from listing content items. Each item's text is JSON: an
/// array of records, or an object wrapping one under `spaces` / `items`.
pub fn spaces_from_items(items: &[ContentItem]) -> Vec<Space> {
    let mut spaces = Vec::new();

    for item in items {
        let payload: Value = match serde_json::from_str(&item.text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(uri = %item.uri, error = %e, "Listing item is not JSON; skipping");
                continue;
            }
        };

        for record in records_of(&payload) {
            match record.as_object().and_then(space_from_record) {
                Some(space) if !spaces.contains(&space) => spaces.push(space),
                Some(_) => {}
                None => debug!(record = %record, "Dropping space record without owner or name"),
            }
        }
    }

    spaces
}

fn records_of(payload: &Value) -> &[Value] {
    match payload {
        Value::Array(records) => records,
        Value::Object(map) => LIST_WRAPPER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_else(|| std::slice::from_ref(payload)),
        _ => &[],
    }
}

fn space_from_record(record: &Map<String, Value>) -> Option<Space> {
    let owner = owner_of(record)?;
    let name = record.get("name").and_then(Value::as_str)?;
    Space::new(&owner, name).ok()
}

fn owner_of(record: &Map<String, Value>) -> Option<String> {
    OWNER_FIELD_ALIASES.iter().find_map(|field| {
        let owner = match record.get(*field)? {
            Value::String(login) => login.as_str(),
            Value::Object(owner) => owner.get("login").and_then(Value::as_str)?,
            _ => return None,
        };
        let owner = owner.trim();
        (!owner.is_empty()).then(|| owner.to_string())
    })
}

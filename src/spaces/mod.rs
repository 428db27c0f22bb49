//! Spaces — catalog of remote spaces and the grounding context built from them.

pub mod catalog;
pub mod loader;

pub use catalog::{OWNER_FIELD_ALIASES, Space, SpaceCatalog};
pub use loader::{ContextLoader, ContextSource, SpaceContext, SpaceFile};

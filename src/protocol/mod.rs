//! Tool-invocation protocol client.
//!
//! - `content`: normalized content items and URI classification
//! - `transport`: session traits the adapter drives
//! - `http`: streamable-HTTP JSON-RPC transport
//! - `adapter`: per-invocation session discipline, deadline, outcome slot

pub mod adapter;
pub mod content;
pub mod http;
pub mod transport;

pub use adapter::{OutcomeSlot, ProtocolAdapter};
pub use content::{ContentItem, ContentKind};
pub use http::StreamableHttpTransport;
pub use transport::{CallToolResult, ToolSession, ToolTransport};

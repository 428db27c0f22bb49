//! Transport seam for the tool-invocation protocol.
//!
//! A [`ToolTransport`] hands out one [`ToolSession`] per invocation. Sessions
//! follow a fixed lifecycle: `initialize` (handshake), any number of
//! `call_tool`s, then `close` (teardown). `close` is where a transport reports
//! failures of its secondary server-push channel, which may only surface after
//! the tool result has already been received.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Raw result of a `tools/call`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// Factory for sessions against one tool endpoint.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Open a new, not-yet-initialized session.
    async fn connect(&self) -> Result<Box<dyn ToolSession>, ProtocolError>;
}

/// A single session with the tool server.
#[async_trait]
pub trait ToolSession: Send {
    /// Perform the protocol handshake.
    async fn initialize(&mut self) -> Result<(), ProtocolError>;

    /// Invoke a remote tool.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, ProtocolError>;

    /// Tear the session down. Errors here may arrive after a successful call.
    async fn close(self: Box<Self>) -> Result<(), ProtocolError>;
}

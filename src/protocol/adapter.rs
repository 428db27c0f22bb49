//! Protocol adapter — one session per tool invocation.
//!
//! Every invocation connects, performs the handshake, calls the tool and tears
//! the session down, all under a single deadline. The tool result is written
//! into an [`OutcomeSlot`] before teardown starts. Once the slot holds a
//! result, a teardown failure is logged and dropped; with an empty slot it is
//! reported as [`ProtocolError::Transient`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::content::{ContentItem, normalize_items};
use super::transport::{CallToolResult, ToolSession, ToolTransport};
use crate::error::ProtocolError;

/// Set-once, read-many holder for a tool result.
///
/// Two states: pending (empty) and captured. The only transition is the first
/// successful [`OutcomeSlot::capture`].
#[derive(Debug)]
pub struct OutcomeSlot<T> {
    cell: OnceLock<T>,
}

impl<T> OutcomeSlot<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Store the outcome. Returns false if one was already captured.
    pub fn capture(&self, value: T) -> bool {
        self.cell.set(value).is_ok()
    }

    pub fn is_captured(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn into_inner(self) -> Option<T> {
        self.cell.into_inner()
    }
}

impl<T> Default for OutcomeSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a session run failed.
#[derive(Debug)]
enum SessionFailure {
    /// Connect, handshake or the call itself.
    Call(ProtocolError),
    /// Teardown, after the call phase completed.
    Teardown(ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connected,
    Ready,
}

/// Enforces handshake-before-call on top of a transport session.
struct Session {
    inner: Box<dyn ToolSession>,
    state: SessionState,
}

impl Session {
    fn new(inner: Box<dyn ToolSession>) -> Self {
        Self {
            inner,
            state: SessionState::Connected,
        }
    }

    async fn handshake(&mut self) -> Result<(), ProtocolError> {
        self.inner.initialize().await?;
        self.state = SessionState::Ready;
        Ok(())
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> Result<CallToolResult, ProtocolError> {
        if self.state != SessionState::Ready {
            return Err(ProtocolError::permanent("uninitialized session"));
        }
        self.inner.call_tool(tool, arguments).await
    }

    async fn close(self) -> Result<(), ProtocolError> {
        self.inner.close().await
    }
}

/// Invokes remote tools and returns normalized content.
pub struct ProtocolAdapter {
    transport: Arc<dyn ToolTransport>,
    deadline: Duration,
}

impl ProtocolAdapter {
    pub fn new(transport: Arc<dyn ToolTransport>, deadline: Duration) -> Self {
        Self {
            transport,
            deadline,
        }
    }

    /// The default deadline applied by [`ProtocolAdapter::invoke`].
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Invoke `tool` with the adapter's default deadline.
    pub async fn invoke(&self, tool: &str, arguments: Value) -> Result<Vec<ContentItem>, ProtocolError> {
        self.invoke_with_deadline(tool, arguments, self.deadline).await
    }

    /// Invoke `tool`, cancelling the whole session if `deadline` expires.
    pub async fn invoke_with_deadline(
        &self,
        tool: &str,
        arguments: Value,
        deadline: Duration,
    ) -> Result<Vec<ContentItem>, ProtocolError> {
        let slot = OutcomeSlot::new();

        let outcome = match tokio::time::timeout(deadline, self.run_session(tool, arguments, &slot)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionFailure::Call(ProtocolError::transient(format!(
                "{tool} timed out after {deadline:?}"
            )))),
        };

        settle(tool, slot, outcome)
    }

    async fn run_session(
        &self,
        tool: &str,
        arguments: Value,
        slot: &OutcomeSlot<Vec<ContentItem>>,
    ) -> Result<(), SessionFailure> {
        let mut session = Session::new(self.transport.connect().await.map_err(SessionFailure::Call)?);

        let called = call_into_slot(&mut session, tool, arguments, slot).await;
        let closed = session.close().await;

        match (called, closed) {
            (Err(e), closed) => {
                if let Err(teardown) = closed {
                    debug!(tool, error = %teardown, "Teardown also failed after call error");
                }
                Err(SessionFailure::Call(e))
            }
            (Ok(()), Err(e)) => Err(SessionFailure::Teardown(e)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

async fn call_into_slot(
    session: &mut Session,
    tool: &str,
    arguments: Value,
    slot: &OutcomeSlot<Vec<ContentItem>>,
) -> Result<(), ProtocolError> {
    session.handshake().await?;
    let result = session.call(tool, arguments).await?;

    if result.is_error {
        let detail = normalize_items(&result.content)
            .into_iter()
            .map(|item| item.text)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ProtocolError::permanent(format!("{tool} reported an error: {detail}")));
    }

    let items = normalize_items(&result.content);
    if items.is_empty() && !result.content.is_empty() {
        return Err(ProtocolError::permanent(format!(
            "{tool} returned {} content item(s), none usable",
            result.content.len()
        )));
    }

    debug!(tool, items = items.len(), "Tool result captured");
    slot.capture(items);
    Ok(())
}

fn settle(
    tool: &str,
    slot: OutcomeSlot<Vec<ContentItem>>,
    outcome: Result<(), SessionFailure>,
) -> Result<Vec<ContentItem>, ProtocolError> {
    match (slot.into_inner(), outcome) {
        (Some(items), Ok(())) => Ok(items),
        (Some(items), Err(SessionFailure::Teardown(e) | SessionFailure::Call(e))) => {
            warn!(tool, error = %e, "Session cleanup failed after result was received; keeping result");
            Ok(items)
        }
        (None, Err(SessionFailure::Call(e))) => Err(e),
        (None, Err(SessionFailure::Teardown(e))) => Err(ProtocolError::transient(format!(
            "session teardown failed before {tool} produced a result: {e}"
        ))),
        (None, Ok(())) => Err(ProtocolError::permanent(format!("{tool} completed without a result"))),
    }
}

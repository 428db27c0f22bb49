//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::chat::ChatGateway;
use crate::conversation::Message;
use crate::error::{ChatError, ProtocolError};
use crate::protocol::{CallToolResult, ToolSession, ToolTransport};
use crate::spaces::{ContextSource, Space, SpaceContext};

/// A `{type: resource}` content item.
pub(crate) fn resource_item(uri: &str, text: &str) -> Value {
    json!({
        "type": "resource",
        "resource": {"uri": uri, "mimeType": "text/plain", "text": text}
    })
}

/// A flat `{type: text}` item carrying JSON.
pub(crate) fn text_item(value: Value) -> Value {
    json!({"type": "text", "text": value.to_string()})
}

/// Counters shared between a [`ScriptedTransport`] and the test.
#[derive(Clone, Default)]
pub(crate) struct CallLog {
    connects: Arc<AtomicUsize>,
    tool_calls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl CallLog {
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn tool_calls(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_to(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(name, _)| name == tool).count()
    }

    pub(crate) fn last_arguments(&self) -> Option<Value> {
        self.calls.lock().unwrap().last().map(|(_, args)| args.clone())
    }
}

#[derive(Clone)]
struct Script {
    default: Result<Vec<Value>, ProtocolError>,
    per_tool: HashMap<String, Vec<Value>>,
    tool_error: bool,
    initialize_error: Option<ProtocolError>,
    close_error: Option<ProtocolError>,
    call_delay: Option<Duration>,
    close_delay: Option<Duration>,
    /// Number of leading calls that fail with `transient_error`.
    failing_first: Arc<AtomicUsize>,
    transient_error: Option<ProtocolError>,
}

/// In-memory transport returning canned tool results.
#[derive(Clone)]
pub(crate) struct ScriptedTransport {
    script: Script,
    log: CallLog,
}

impl ScriptedTransport {
    pub(crate) fn new(content: Vec<Value>) -> Self {
        Self::with_default(Ok(content))
    }

    pub(crate) fn failing_call(error: ProtocolError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default: Result<Vec<Value>, ProtocolError>) -> Self {
        Self {
            script: Script {
                default,
                per_tool: HashMap::new(),
                tool_error: false,
                initialize_error: None,
                close_error: None,
                call_delay: None,
                close_delay: None,
                failing_first: Arc::new(AtomicUsize::new(0)),
                transient_error: None,
            },
            log: CallLog::default(),
        }
    }

    pub(crate) fn with_tool(mut self, tool: &str, content: Vec<Value>) -> Self {
        self.script.per_tool.insert(tool.to_string(), content);
        self
    }

    pub(crate) fn with_initialize_error(mut self, error: ProtocolError) -> Self {
        self.script.initialize_error = Some(error);
        self
    }

    pub(crate) fn with_close_error(mut self, error: ProtocolError) -> Self {
        self.script.close_error = Some(error);
        self
    }

    pub(crate) fn with_call_delay(mut self, delay: Duration) -> Self {
        self.script.call_delay = Some(delay);
        self
    }

    pub(crate) fn with_close_delay(mut self, delay: Duration) -> Self {
        self.script.close_delay = Some(delay);
        self
    }

    pub(crate) fn failing_first(self, count: usize, error: ProtocolError) -> Self {
        self.script.failing_first.store(count, Ordering::SeqCst);
        Self {
            script: Script {
                transient_error: Some(error),
                ..self.script
            },
            log: self.log,
        }
    }

    pub(crate) fn as_tool_error(mut self) -> Self {
        self.script.tool_error = true;
        self
    }

    pub(crate) fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl ToolTransport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn ToolSession>, ProtocolError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            log: self.log.clone(),
        }))
    }
}

struct ScriptedSession {
    script: Script,
    log: CallLog,
}

#[async_trait]
impl ToolSession for ScriptedSession {
    async fn initialize(&mut self) -> Result<(), ProtocolError> {
        match self.script.initialize_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, ProtocolError> {
        self.log.tool_calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        if let Some(delay) = self.script.call_delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.script.failing_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.failing_first.store(remaining - 1, Ordering::SeqCst);
            if let Some(ref e) = self.script.transient_error {
                return Err(e.clone());
            }
        }

        let content = match self.script.per_tool.get(name) {
            Some(content) => content.clone(),
            None => self.script.default.clone()?,
        };
        Ok(CallToolResult {
            content,
            is_error: self.script.tool_error,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), ProtocolError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.script.close_delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.close_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Context source that counts loads and optionally stalls.
pub(crate) struct CountingSource {
    pub(crate) loads: AtomicUsize,
    pub(crate) delay: Duration,
    pub(crate) fail_first: AtomicUsize,
}

impl CountingSource {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            delay,
            fail_first: AtomicUsize::new(0),
        }
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextSource for CountingSource {
    async fn load(&self, space: &Space) -> Result<SpaceContext, ProtocolError> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail_first.load(Ordering::SeqCst) > n {
            return Err(ProtocolError::transient("tool server unavailable"));
        }
        Ok(SpaceContext {
            space_ref: space.space_ref.clone(),
            display_name: space.name.clone(),
            system_prompt: format!("grounding for {} (load #{})", space.space_ref, n + 1),
            files: Vec::new(),
            fetched_at: Utc::now(),
        })
    }
}

/// Chat gateway that echoes the last user message and records what it saw.
#[derive(Default)]
pub(crate) struct EchoChat {
    pub(crate) seen: Mutex<Vec<(String, Vec<Message>)>>,
    pub(crate) fail_with: Mutex<Option<ChatError>>,
}

impl EchoChat {
    pub(crate) fn requests(&self) -> Vec<(String, Vec<Message>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatGateway for EchoChat {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, system_prompt: &str, history: &[Message]) -> Result<Message, ChatError> {
        self.seen
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), history.to_vec()));
        if let Some(e) = self.fail_with.lock().unwrap().take() {
            return Err(e);
        }
        let last = history.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(Message::assistant(format!("echo: {last}")))
    }
}

//! Streamable-HTTP transport for the tool server.
//!
//! JSON-RPC 2.0 requests are POSTed to a single endpoint. A response is either
//! a plain JSON body or an SSE stream whose `data:` lines carry JSON-RPC
//! messages. After the handshake the client also opens a GET stream for
//! server-initiated messages; some servers answer that with 405 or 502. A
//! failure that has already arrived is reported from [`ToolSession::close`];
//! a channel still open at that point is aborted without waiting.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::transport::{CallToolResult, ToolSession, ToolTransport};
use crate::error::ProtocolError;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const RPC_ACCEPT: &str = "application/json, text/event-stream";
const CLIENT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Transport speaking JSON-RPC over streamable HTTP, authenticated with a
/// bearer token.
pub struct StreamableHttpTransport {
    client: reqwest::Client,
    endpoint: String,
    token: SecretString,
}

impl StreamableHttpTransport {
    pub fn new(endpoint: impl Into<String>, token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl ToolTransport for StreamableHttpTransport {
    async fn connect(&self) -> Result<Box<dyn ToolSession>, ProtocolError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            session_id: None,
            next_id: 1,
            initialized: false,
            push: None,
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
    endpoint: String,
    token: SecretString,
    session_id: Option<String>,
    next_id: i64,
    initialized: bool,
    /// Background GET stream for server-initiated messages.
    push: Option<JoinHandle<Result<(), ProtocolError>>>,
}

impl HttpSession {
    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, &self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .header(USER_AGENT, CLIENT_AGENT);
        if let Some(ref id) = self.session_id {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder
    }

    async fn rpc(&mut self, method: &str, params: Value) -> Result<Value, ProtocolError> {
        let id = self.next_id;
        self.next_id += 1;

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .request(Method::POST)
            .header(ACCEPT, RPC_ACCEPT)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(method, status, &text));
        }

        if let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let text = response.text().await.map_err(|e| transport_error(method, e))?;

        let message = if is_event_stream {
            find_event_response(&text, id).ok_or_else(|| {
                ProtocolError::transient(format!("{method}: event stream ended without a response"))
            })?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ProtocolError::permanent(format!("{method}: invalid JSON-RPC body: {e}")))?
        };

        rpc_result(method, message)
    }

    async fn notify(&self, method: &str) -> Result<(), ProtocolError> {
        let body = json!({"jsonrpc": "2.0", "method": method});
        let response = self
            .request(Method::POST)
            .header(ACCEPT, RPC_ACCEPT)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(method, status, &text));
        }
        Ok(())
    }

    fn open_push_channel(&self) -> JoinHandle<Result<(), ProtocolError>> {
        let request = self.request(Method::GET).header(ACCEPT, "text/event-stream");
        tokio::spawn(async move {
            let mut response = request
                .send()
                .await
                .map_err(|e| transport_error("push channel", e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProtocolError::transient(format!(
                    "server push channel rejected with {status}"
                )));
            }

            // Server-initiated messages are not used; drain until the server hangs up.
            while response
                .chunk()
                .await
                .map_err(|e| transport_error("push channel", e))?
                .is_some()
            {}
            Ok(())
        })
    }
}

#[async_trait]
impl ToolSession for HttpSession {
    async fn initialize(&mut self) -> Result<(), ProtocolError> {
        let result = self
            .rpc(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;

        let server = result.get("serverInfo").cloned().unwrap_or_default();
        debug!(
            server = %server,
            session = self.session_id.as_deref().unwrap_or("<none>"),
            "Tool server handshake complete"
        );

        self.notify("notifications/initialized").await?;
        self.push = Some(self.open_push_channel());
        self.initialized = true;
        Ok(())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, ProtocolError> {
        if !self.initialized {
            return Err(ProtocolError::permanent("uninitialized session"));
        }

        let result = self
            .rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        serde_json::from_value(result)
            .map_err(|e| ProtocolError::permanent(format!("tools/call {name}: unexpected result shape: {e}")))
    }

    async fn close(mut self: Box<Self>) -> Result<(), ProtocolError> {
        // A push channel still open once the call is done carries nothing we
        // need; only a channel that already ended reports its outcome.
        let push_outcome = match self.push.take() {
            Some(handle) if handle.is_finished() => match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(ProtocolError::transient(format!(
                    "server push channel task failed: {join_error}"
                ))),
            },
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => Ok(()),
        };

        if self.session_id.is_some() {
            match self.request(Method::DELETE).send().await {
                Ok(response) if !response.status().is_success() => {
                    debug!(status = %response.status(), "Session delete not acknowledged");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Session delete failed"),
            }
        }

        if let Err(ref e) = push_outcome {
            info!(error = %e, "Tool session closed with push channel failure");
        }
        push_outcome
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        if let Some(handle) = self.push.take() {
            handle.abort();
        }
    }
}

/// Pick the JSON-RPC response with `id` out of an SSE body.
fn find_event_response(body: &str, id: i64) -> Option<Value> {
    let mut data = String::new();
    let mut events = Vec::new();

    for line in body.lines() {
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<Value>(event).ok())
        .find(|message| message.get("id").and_then(Value::as_i64) == Some(id))
}

fn rpc_result(method: &str, mut message: Value) -> Result<Value, ProtocolError> {
    if let Some(error) = message.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let text = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(ProtocolError::permanent(format!("{method} failed ({code}): {text}")));
    }
    match message.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ProtocolError::permanent(format!("{method}: response has no result"))),
    }
}

fn status_error(method: &str, status: StatusCode, body: &str) -> ProtocolError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProtocolError::transient(format!("{method}: HTTP {status}: {snippet}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProtocolError::permanent(format!("{method}: credential rejected (HTTP {status})"))
    } else {
        ProtocolError::permanent(format!("{method}: HTTP {status}: {snippet}"))
    }
}

fn transport_error(context: &str, error: reqwest::Error) -> ProtocolError {
    if error.is_decode() || error.is_builder() {
        ProtocolError::permanent(format!("{context}: {error}"))
    } else {
        ProtocolError::transient(format!("{context}: {error}"))
    }
}

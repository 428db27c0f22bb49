//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, error, info};

use super::{ChatGateway, build_messages};
use crate::conversation::Message;
use crate::error::ChatError;

const CLIENT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Chat gateway backed by a `/chat/completions` endpoint.
pub struct ModelsChatGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    token: SecretString,
}

impl ModelsChatGateway {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Unavailable {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            token,
        })
    }
}

#[async_trait]
impl ChatGateway for ModelsChatGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: &str, history: &[Message]) -> Result<Message, ChatError> {
        let messages = build_messages(system_prompt, history);
        debug!(model = %self.model, messages = messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_AGENT)
            .json(&json!({"model": self.model, "messages": messages}))
            .send()
            .await
            .map_err(|e| ChatError::Unavailable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %truncate(&body, 300), "Chat completion failed");
            return Err(classify_status(status, retry_after, &body));
        }

        let payload: Value = response.json().await.map_err(|e| ChatError::Malformed {
            reason: format!("response is not JSON: {}", e),
        })?;
        let content = extract_reply(&payload)?;
        info!(model = %self.model, chars = content.len(), "Chat completion received");
        Ok(Message::assistant(content))
    }
}

/// Map a non-success status onto the chat error taxonomy.
pub(crate) fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ChatError {
    let reason = format!("{}: {}", status, truncate(body, 200));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::AuthRejected { reason },
        StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => ChatError::Unavailable { reason },
        s if s.is_server_error() => ChatError::Unavailable { reason },
        _ => ChatError::Malformed { reason },
    }
}

/// Pull the assistant text out of a completion payload.
///
/// Accepts the standard `choices[0].message.content` shape and a bare
/// `message.content` fallback.
pub(crate) fn extract_reply(payload: &Value) -> Result<String, ChatError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .or_else(|| payload.pointer("/message/content"))
        .and_then(Value::as_str);

    match content {
        Some(text) => Ok(text.to_string()),
        None => Err(ChatError::Malformed {
            reason: "no assistant content in response".to_string(),
        }),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

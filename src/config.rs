//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Dedicated toolset endpoint; the generic MCP endpoint does not expose spaces.
pub const DEFAULT_MCP_URL: &str = "https://api.githubcopilot.com/mcp/x/copilot_spaces";
/// OpenAI-compatible chat endpoint that accepts personal access tokens.
pub const DEFAULT_CHAT_URL: &str = "https://models.inference.ai.azure.com/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// Remote tool names for the two operations the bridge needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNames {
    pub list_spaces: String,
    pub get_space: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            list_spaces: "list_copilot_spaces".to_string(),
            get_space: "get_copilot_space".to_string(),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bearer credential forwarded to the tool server and the chat API.
    pub token: SecretString,
    /// Tool-invocation endpoint.
    pub mcp_url: String,
    /// Chat-completion endpoint.
    pub chat_url: String,
    /// Model requested from the chat API.
    pub chat_model: String,
    pub tools: ToolNames,
    /// Deadline for a single tool invocation (handshake + call + teardown).
    pub protocol_timeout: Duration,
    /// Timeout for a single chat-completion request.
    pub chat_timeout: Duration,
    pub retry: RetryPolicy,
    /// Maximum number of history messages replayed to the chat API per turn.
    pub history_window: usize,
    /// HTTP listen port.
    pub port: u16,
}

impl BridgeConfig {
    /// Build a config with defaults for everything except the credential.
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            mcp_url: DEFAULT_MCP_URL.to_string(),
            chat_url: DEFAULT_CHAT_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            tools: ToolNames::default(),
            protocol_timeout: Duration::from_secs(30),
            chat_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            history_window: 20,
            port: 3002,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("GITHUB_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GITHUB_TOKEN".to_string()))?;

        let mut config = Self::new(SecretString::from(token));

        if let Some(url) = lookup("SPACES_MCP_URL") {
            config.mcp_url = url;
        }
        if let Some(url) = lookup("SPACES_CHAT_URL") {
            config.chat_url = url;
        }
        if let Some(model) = lookup("SPACES_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(name) = lookup("SPACES_LIST_TOOL") {
            config.tools.list_spaces = name;
        }
        if let Some(name) = lookup("SPACES_GET_TOOL") {
            config.tools.get_space = name;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SPACES_PROTOCOL_TIMEOUT_SECS")? {
            config.protocol_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SPACES_CHAT_TIMEOUT_SECS")? {
            config.chat_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "SPACES_RETRY_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SPACES_RETRY_ATTEMPTS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(window) = parse_var::<usize, _>(&lookup, "SPACES_HISTORY_WINDOW")? {
            config.history_window = window;
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "API_BRIDGE_PORT")? {
            config.port = port;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

//! Error types for the spaces bridge.

use std::time::Duration;

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Tool-invocation protocol errors.
///
/// Transient failures (network, timeouts, 429/5xx, a push channel that died
/// before any result arrived) may be retried by the caller. Permanent ones
/// (bad handshake, rejected credential, JSON-RPC errors) may not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

impl ProtocolError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Space catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Space not found: {space_ref}")]
    SpaceNotFound { space_ref: String },

    #[error("Invalid space reference: {reason}")]
    InvalidSpace { reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Conversation lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Conversation {id} belongs to space {existing}, not {requested}")]
    Mismatch {
        id: String,
        existing: String,
        requested: String,
    },
}

/// Chat-completion errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat endpoint rejected the credential: {reason}")]
    AuthRejected { reason: String },

    #[error("Chat endpoint rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Chat endpoint unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed chat response: {reason}")]
    Malformed { reason: String },
}

impl ChatError {
    /// Whether a bounded retry with backoff may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;

//! Bounded retry with exponential backoff and jitter.
//!
//! Only failures that classify themselves as retryable are attempted again;
//! everything else is returned on the first occurrence.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{CatalogError, ChatError, ProtocolError};

/// Classification hook for errors that may be retried.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-provided delay hint, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ProtocolError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for CatalogError {
    fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Protocol(e) if e.is_transient())
    }
}

impl Retryable for ChatError {
    fn is_retryable(&self) -> bool {
        ChatError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ChatError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the given retry (1-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        let jitter_ms = delay.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted.
pub async fn with_backoff<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = e
                    .retry_after()
                    .map(|hint| hint.min(policy.max_delay))
                    .unwrap_or_else(|| policy.jittered(attempt));
                warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

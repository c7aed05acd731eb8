//! Error types for requests run through the engine.

use std::fmt;

/// Failure of a single request attempt.
///
/// The variants line up with the three classification tiers: an HTTP status,
/// a named network category, or only a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Response arrived with a non-success status.
    #[error("HTTP {status}")]
    Http { status: u16 },
    /// Transport-level failure with a known category (e.g. `TimeoutError`).
    #[error("{name}: {message}")]
    Network { name: String, message: String },
    /// Anything else; classified by message keywords only.
    #[error("{0}")]
    Other(String),
}

impl RequestError {
    pub fn network(name: impl Into<String>, message: impl Into<String>) -> Self {
        RequestError::Network {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Terminal failure of `execute_with_retry`: the last attempt's error plus
/// attempt bookkeeping.
///
/// Budget exhaustion and a non-retryable failure share this type; use
/// [`RetryError::exhausted`] to tell them apart.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    /// Number of times the request was invoked.
    pub retry_attempts: u32,
    pub max_retries: u32,
    pub request_id: String,
    /// Whether the policy classified the last error as retryable.
    pub retryable: bool,
}

impl<E> RetryError<E> {
    /// Drop the annotations and return the underlying error.
    pub fn into_inner(self) -> E {
        self.error
    }

    /// True when the error was retryable but the attempt budget ran out.
    pub fn exhausted(&self) -> bool {
        self.retryable && self.retry_attempts > self.max_retries
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (request {} gave up after {} attempt(s), max retries {})",
            self.error, self.request_id, self.retry_attempts, self.max_retries
        )
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

//! Per-call request context and request id generation.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::distr::Alphanumeric;
use rand::Rng;

const REQUEST_ID_SUFFIX_LEN: usize = 9;

/// What the engine knows about a call: where it goes and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Absolute or relative URL; matched against endpoint keys by substring.
    pub url: String,
    /// HTTP verb, case-insensitive.
    pub method: String,
    /// Caller-supplied tracking id. Generated when absent.
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Generate a tracking id: epoch milliseconds plus a random alphanumeric suffix.
///
/// Collisions are unlikely but not ruled out.
pub fn generate_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(REQUEST_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("req_{millis}_{suffix}")
}

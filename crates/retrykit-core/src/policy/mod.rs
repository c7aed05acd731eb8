//! Retry policy model and layered resolution.
//!
//! A [`RetryPolicy`] is always fully populated. Partial configuration lives
//! in [`PolicyOverride`] values that are merged onto a policy field by field
//! (present fields win). The [`PolicyRegistry`] holds the default policy plus
//! per-method and per-endpoint overrides and resolves the effective policy
//! for a request.

mod registry;

pub use registry::PolicyRegistry;

use std::collections::BTreeSet;
use std::time::Duration;

/// HTTP statuses retried by the reference configuration.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Named error categories retried by the reference configuration.
pub const DEFAULT_RETRYABLE_ERRORS: [&str; 4] =
    ["NetworkError", "TimeoutError", "ConnectionError", "AbortError"];

/// Fully resolved retry parameters for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum additional attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry, before growth and jitter.
    pub base_delay: Duration,
    /// Upper bound on the pre-jitter delay.
    pub max_delay: Duration,
    /// Geometric growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Fraction of the capped delay that is randomized, in [0, 1].
    pub jitter_factor: f64,
    pub retryable_statuses: BTreeSet<u16>,
    pub retryable_errors: BTreeSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Return a copy of `self` with every field present in `over` replaced.
    pub fn merged(&self, over: &PolicyOverride) -> RetryPolicy {
        RetryPolicy {
            max_retries: over.max_retries.unwrap_or(self.max_retries),
            base_delay: over.base_delay.unwrap_or(self.base_delay),
            max_delay: over.max_delay.unwrap_or(self.max_delay),
            backoff_multiplier: over.backoff_multiplier.unwrap_or(self.backoff_multiplier),
            jitter_factor: over.jitter_factor.unwrap_or(self.jitter_factor),
            retryable_statuses: over
                .retryable_statuses
                .clone()
                .unwrap_or_else(|| self.retryable_statuses.clone()),
            retryable_errors: over
                .retryable_errors
                .clone()
                .unwrap_or_else(|| self.retryable_errors.clone()),
        }
    }
}

/// A partial policy: only the fields that are `Some` take effect when merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverride {
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub backoff_multiplier: Option<f64>,
    pub jitter_factor: Option<f64>,
    pub retryable_statuses: Option<BTreeSet<u16>>,
    pub retryable_errors: Option<BTreeSet<String>>,
}

impl PolicyOverride {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = Some(d);
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.backoff_multiplier = Some(m);
        self
    }

    pub fn jitter_factor(mut self, j: f64) -> Self {
        self.jitter_factor = Some(j);
        self
    }

    pub fn retryable_statuses<I: IntoIterator<Item = u16>>(mut self, statuses: I) -> Self {
        self.retryable_statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn retryable_errors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Expand into an override with every field set: `base` merged with `self`.
    ///
    /// Used by registry updates, which replace an override wholesale rather
    /// than accumulating onto the previous one.
    pub fn rebased_on(&self, base: &RetryPolicy) -> PolicyOverride {
        PolicyOverride::from(base.merged(self))
    }
}

impl From<RetryPolicy> for PolicyOverride {
    fn from(p: RetryPolicy) -> Self {
        Self {
            max_retries: Some(p.max_retries),
            base_delay: Some(p.base_delay),
            max_delay: Some(p.max_delay),
            backoff_multiplier: Some(p.backoff_multiplier),
            jitter_factor: Some(p.jitter_factor),
            retryable_statuses: Some(p.retryable_statuses),
            retryable_errors: Some(p.retryable_errors),
        }
    }
}

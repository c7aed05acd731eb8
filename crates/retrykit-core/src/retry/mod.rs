//! Retry engine.
//!
//! Error classification (status, named category, message keywords),
//! exponential backoff with jitter, the attempt loop and the in-flight
//! request tracker. [`RetryManager`] ties them together.

mod backoff;
mod classify;
mod error;
mod manager;
mod run;
mod tracker;

pub use backoff::{capped_delay_ms, compute_delay, FixedJitter, JitterSource, ThreadRngJitter};
pub use classify::{
    classify_curl_error, classify_http_status, is_retryable, Classify, RETRYABLE_MESSAGE_KEYWORDS,
};
pub use error::{RequestError, RetryError};
pub use manager::{ManagerOptions, RetryManager};
pub use tracker::{sweep, AttemptTracker, RetryStats, TrackedRequest};

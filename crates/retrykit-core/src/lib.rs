//! Layered HTTP retry policies: per-method and per-endpoint overrides on top
//! of a default policy, exponential backoff with jitter, and bookkeeping for
//! in-flight retry sequences.

pub mod clock;
pub mod config;
pub mod logging;
pub mod policy;
pub mod probe;
pub mod request;
pub mod retry;

pub use policy::{PolicyOverride, PolicyRegistry, RetryPolicy};
pub use request::RequestContext;
pub use retry::{Classify, RequestError, RetryError, RetryManager};

//! Exponential backoff with symmetric jitter.

use std::time::Duration;

use crate::policy::RetryPolicy;

/// Source of uniform samples in `[0, 1)` used to spread delays.
pub trait JitterSource: Send + Sync {
    fn unit(&self) -> f64;
}

/// Fresh draw from the thread-local RNG on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn unit(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Always returns the same sample. 0.5 means "no jitter".
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn unit(&self) -> f64 {
        self.0
    }
}

/// Pre-jitter delay for the given 0-based retry index, capped at `max_delay`.
pub fn capped_delay_ms(attempt_index: u32, policy: &RetryPolicy) -> f64 {
    let base = policy.base_delay.as_millis() as f64;
    let cap = policy.max_delay.as_millis() as f64;
    let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
    let exponential = base * policy.backoff_multiplier.powi(exponent);
    // 0 * inf for a zero base delay at very large indices.
    if exponential.is_nan() {
        return 0.0;
    }
    exponential.min(cap)
}

/// Delay before retry `attempt_index` (0 = before the first retry).
///
/// `capped * (1 ± jitter_factor)`, rounded to whole milliseconds and
/// clamped at zero.
pub fn compute_delay(attempt_index: u32, policy: &RetryPolicy, jitter: &dyn JitterSource) -> Duration {
    let capped = capped_delay_ms(attempt_index, policy);
    let span = capped * policy.jitter_factor;
    let offset = (jitter.unit() * 2.0 - 1.0) * span;
    let ms = (capped + offset).round().max(0.0);
    Duration::from_millis(ms as u64)
}

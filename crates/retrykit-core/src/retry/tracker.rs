//! Bookkeeping for in-flight retry sequences.
//!
//! One entry per request id, created when execution begins and removed on
//! success, final failure, or by the stale sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::request::RequestContext;

/// Tracker state for one in-flight request.
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    pub start_time: Instant,
    /// Attempts started so far (1 while the first attempt runs).
    pub attempts: u32,
    pub context: RequestContext,
}

/// Snapshot of a tracked request for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStats {
    pub request_id: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub url: String,
    pub method: String,
}

/// Map of request id to tracker state.
#[derive(Debug, Default)]
pub struct AttemptTracker {
    entries: HashMap<String, TrackedRequest>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, request_id: &str, context: RequestContext, now: Instant) {
        self.entries.insert(
            request_id.to_string(),
            TrackedRequest {
                start_time: now,
                attempts: 0,
                context,
            },
        );
    }

    /// Record that attempt number `attempts` has started. Never lowers the count.
    pub fn record_attempt(&mut self, request_id: &str, attempts: u32) {
        if let Some(entry) = self.entries.get_mut(request_id) {
            entry.attempts = entry.attempts.max(attempts);
        }
    }

    pub fn finish(&mut self, request_id: &str) -> Option<TrackedRequest> {
        self.entries.remove(request_id)
    }

    pub fn stats(&self, request_id: &str, now: Instant) -> Option<RetryStats> {
        self.entries
            .get(request_id)
            .map(|entry| to_stats(request_id, entry, now))
    }

    pub fn all_stats(&self, now: Instant) -> Vec<RetryStats> {
        let mut all: Vec<RetryStats> = self
            .entries
            .iter()
            .map(|(id, entry)| to_stats(id, entry, now))
            .collect();
        all.sort_by(|a, b| b.elapsed.cmp(&a.elapsed).then_with(|| a.request_id.cmp(&b.request_id)));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries older than `threshold`. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant, threshold: Duration) -> usize {
        let before = self.entries.len();
        self.entries = sweep(now, std::mem::take(&mut self.entries), threshold);
        before - self.entries.len()
    }

    /// Insert an entry as-is. Lets hosts and tests seed state directly.
    pub fn insert(&mut self, request_id: &str, entry: TrackedRequest) {
        self.entries.insert(request_id.to_string(), entry);
    }
}

/// Entries whose age does not exceed `threshold`.
pub fn sweep(
    now: Instant,
    entries: HashMap<String, TrackedRequest>,
    threshold: Duration,
) -> HashMap<String, TrackedRequest> {
    entries
        .into_iter()
        .filter(|(_, entry)| now.saturating_duration_since(entry.start_time) <= threshold)
        .collect()
}

fn to_stats(request_id: &str, entry: &TrackedRequest, now: Instant) -> RetryStats {
    RetryStats {
        request_id: request_id.to_string(),
        attempts: entry.attempts,
        elapsed: now.saturating_duration_since(entry.start_time),
        url: entry.context.url.clone(),
        method: entry.context.method.clone(),
    }
}

//! The retry engine: owns the policy registry, the attempt tracker and the
//! injected time/jitter sources.

use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::RetryKitConfig;
use crate::policy::{PolicyOverride, PolicyRegistry, RetryPolicy};
use crate::request::RequestContext;

use super::backoff::{JitterSource, ThreadRngJitter};
use super::tracker::{AttemptTracker, RetryStats, TrackedRequest};

/// Tracker housekeeping and log gating.
#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    /// Emit tracing events at each decision point.
    pub enable_logging: bool,
    /// Entries older than this are dropped by the sweep.
    pub stale_after: Duration,
    /// Period of the background sweep started by `start_sweeper`.
    pub sweep_interval: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            enable_logging: true,
            stale_after: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Retry policy engine.
///
/// Create one at startup and share it (`Arc<RetryManager>`) with call sites.
/// Concurrent executions each own one tracker slot keyed by request id; the
/// locks guarding shared state are never held across an await.
pub struct RetryManager {
    pub(super) registry: RwLock<PolicyRegistry>,
    pub(super) tracker: Mutex<AttemptTracker>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) sleeper: Arc<dyn Sleeper>,
    pub(super) jitter: Arc<dyn JitterSource>,
    pub(super) options: ManagerOptions,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryManager")
            .field("registry", &*self.registry.read())
            .field("tracked", &self.tracker.lock().len())
            .field("options", &self.options)
            .finish()
    }
}

impl RetryManager {
    pub fn new(registry: PolicyRegistry, options: ManagerOptions) -> Self {
        Self {
            registry: RwLock::new(registry),
            tracker: Mutex::new(AttemptTracker::new()),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(ThreadRngJitter),
            options,
            sweeper: Mutex::new(None),
        }
    }

    /// Build from loaded configuration.
    pub fn from_config(cfg: &RetryKitConfig) -> Result<Self> {
        Ok(Self::new(cfg.build_registry()?, cfg.manager_options()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Effective policy for a request: default, then method, then endpoint.
    pub fn resolve_policy(&self, ctx: &RequestContext) -> RetryPolicy {
        self.registry.read().resolve(ctx)
    }

    /// Replace the override for an endpoint key; the partial is merged onto the default.
    pub fn update_endpoint_policy(&self, key: &str, partial: &PolicyOverride) {
        self.registry.write().update_endpoint_policy(key, partial);
        if self.options.enable_logging {
            tracing::info!(endpoint = key, "endpoint retry policy updated");
        }
    }

    /// Replace the override for an HTTP method; the partial is merged onto the default.
    pub fn update_method_policy(&self, method: &str, partial: &PolicyOverride) {
        self.registry.write().update_method_policy(method, partial);
        if self.options.enable_logging {
            tracing::info!(method, "method retry policy updated");
        }
    }

    /// Copy of the current registry.
    pub fn registry(&self) -> PolicyRegistry {
        self.registry.read().clone()
    }

    pub fn retry_stats(&self, request_id: &str) -> Option<RetryStats> {
        self.tracker.lock().stats(request_id, self.clock.now())
    }

    /// Stats for every tracked request, oldest first.
    pub fn all_retry_stats(&self) -> Vec<RetryStats> {
        self.tracker.lock().all_stats(self.clock.now())
    }

    /// Seed a tracker entry directly, bypassing `execute_with_retry`.
    pub fn track(&self, request_id: &str, entry: TrackedRequest) {
        self.tracker.lock().insert(request_id, entry);
    }

    pub fn clear_all_tracking(&self) {
        self.tracker.lock().clear();
    }

    /// Drop tracker entries older than `stale_after`. Returns how many went.
    ///
    /// Does not touch the underlying calls; only the bookkeeping.
    pub fn sweep_stale(&self) -> usize {
        let removed = self
            .tracker
            .lock()
            .sweep(self.clock.now(), self.options.stale_after);
        if removed > 0 && self.options.enable_logging {
            tracing::debug!(removed, "swept stale retry trackers");
        }
        removed
    }

    /// Run `sweep_stale` every `sweep_interval` on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the manager is
    /// dropped. Calling again replaces the previous task.
    pub fn start_sweeper(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.options.sweep_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.sweep_stale();
            }
        });
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the background sweep and forget all tracked requests.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.clear_all_tracking();
    }
}

impl Drop for RetryManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager(clock: Arc<ManualClock>) -> RetryManager {
        RetryManager::new(PolicyRegistry::default(), ManagerOptions::default()).with_clock(clock)
    }

    fn entry(clock: &ManualClock, url: &str) -> TrackedRequest {
        TrackedRequest {
            start_time: clock.now(),
            attempts: 1,
            context: RequestContext::new(url, "GET"),
        }
    }

    #[test]
    fn abandoned_entry_is_swept_after_threshold() {
        let clock = Arc::new(ManualClock::new());
        let m = manager(Arc::clone(&clock));
        m.track("leaked", entry(&clock, "/orders"));

        clock.advance(Duration::from_secs(9 * 60));
        assert_eq!(m.sweep_stale(), 0);
        assert!(m.retry_stats("leaked").is_some());

        clock.advance(Duration::from_secs(2 * 60));
        assert_eq!(m.sweep_stale(), 1);
        assert!(m.retry_stats("leaked").is_none());
    }

    #[test]
    fn stats_report_elapsed_from_clock() {
        let clock = Arc::new(ManualClock::new());
        let m = manager(Arc::clone(&clock));
        m.track("a", entry(&clock, "/products"));
        clock.advance(Duration::from_millis(1500));
        let s = m.retry_stats("a").unwrap();
        assert_eq!(s.elapsed, Duration::from_millis(1500));
        assert_eq!(m.all_retry_stats().len(), 1);
    }

    #[test]
    fn clear_and_destroy_empty_tracker() {
        let clock = Arc::new(ManualClock::new());
        let m = manager(Arc::clone(&clock));
        m.track("a", entry(&clock, "/a"));
        m.track("b", entry(&clock, "/b"));
        m.clear_all_tracking();
        assert!(m.all_retry_stats().is_empty());
        m.track("c", entry(&clock, "/c"));
        m.destroy();
        assert!(m.all_retry_stats().is_empty());
    }

    #[test]
    fn updates_go_through_registry() {
        let m = RetryManager::new(PolicyRegistry::default(), ManagerOptions::default());
        m.update_method_policy("put", &PolicyOverride::default().max_retries(0));
        m.update_endpoint_policy("/health", &PolicyOverride::default().max_retries(8));
        assert_eq!(m.resolve_policy(&RequestContext::new("/x", "PUT")).max_retries, 0);
        assert_eq!(m.resolve_policy(&RequestContext::new("/health", "PUT")).max_retries, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_runs_and_stops_on_destroy() {
        let clock = Arc::new(ManualClock::new());
        let options = ManagerOptions {
            sweep_interval: Duration::from_secs(300),
            ..ManagerOptions::default()
        };
        let m = Arc::new(
            RetryManager::new(PolicyRegistry::default(), options).with_clock(Arc::clone(&clock) as Arc<dyn Clock>),
        );
        m.track("old", entry(&clock, "/x"));
        clock.advance(Duration::from_secs(11 * 60));

        m.start_sweeper();
        assert!(m.sweeper_running());
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(m.retry_stats("old").is_none());

        m.destroy();
        assert!(!m.sweeper_running());
    }
}

//! Retry loop: run a request until success, a non-retryable failure, or
//! the attempt budget runs out.

use std::future::Future;

use crate::request::{generate_request_id, RequestContext};

use super::backoff::compute_delay;
use super::classify::{is_retryable, Classify};
use super::error::RetryError;
use super::manager::RetryManager;

impl RetryManager {
    /// Invoke `request` until it succeeds or the resolved policy says stop.
    ///
    /// `request` is called at most `max_retries + 1` times, where
    /// `max_retries` is `max_retries_override` or the policy's value.
    /// Attempts are strictly sequential with a backoff sleep in between. On
    /// failure the last error is returned unchanged inside [`RetryError`].
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        ctx: &RequestContext,
        max_retries_override: Option<u32>,
        mut request: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let request_id = ctx
            .request_id
            .clone()
            .unwrap_or_else(generate_request_id);
        let policy = self.resolve_policy(ctx);
        let max_retries = max_retries_override.unwrap_or(policy.max_retries);
        let log = self.options.enable_logging;

        self.tracker
            .lock()
            .begin(&request_id, ctx.clone(), self.clock.now());

        let mut attempt_number: u32 = 0;
        loop {
            self.tracker
                .lock()
                .record_attempt(&request_id, attempt_number + 1);
            if log {
                tracing::debug!(
                    request_id = %request_id,
                    attempt = attempt_number + 1,
                    max_retries,
                    url = %ctx.url,
                    method = %ctx.method,
                    "attempt started"
                );
            }

            let error = match request().await {
                Ok(value) => {
                    self.tracker.lock().finish(&request_id);
                    if log && attempt_number > 0 {
                        tracing::info!(
                            request_id = %request_id,
                            attempts = attempt_number + 1,
                            "request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            attempt_number += 1;
            let retryable = is_retryable(&error, &policy);
            if attempt_number > max_retries || !retryable {
                self.tracker.lock().finish(&request_id);
                if log {
                    tracing::warn!(
                        request_id = %request_id,
                        attempts = attempt_number,
                        max_retries,
                        retryable,
                        status = ?error.status(),
                        error = %error.message(),
                        "request failed, giving up"
                    );
                }
                return Err(RetryError {
                    error,
                    retry_attempts: attempt_number,
                    max_retries,
                    request_id,
                    retryable,
                });
            }

            let delay = compute_delay(attempt_number - 1, &policy, self.jitter.as_ref());
            if log {
                tracing::info!(
                    request_id = %request_id,
                    attempt = attempt_number,
                    delay_ms = delay.as_millis() as u64,
                    status = ?error.status(),
                    error = %error.message(),
                    "retrying request"
                );
            }
            self.sleeper.sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::clock::{ManualClock, RecordingSleeper};
    use crate::policy::{PolicyOverride, PolicyRegistry, RetryPolicy};
    use crate::request::RequestContext;
    use crate::retry::backoff::FixedJitter;
    use crate::retry::error::RequestError;
    use crate::retry::manager::{ManagerOptions, RetryManager};

    fn engine(sleeper: Arc<RecordingSleeper>) -> RetryManager {
        engine_with(sleeper, ManagerOptions::default())
    }

    fn engine_with(sleeper: Arc<RecordingSleeper>, options: ManagerOptions) -> RetryManager {
        let default = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(4000),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable_statuses: [500, 502, 503, 504].into_iter().collect(),
            ..RetryPolicy::default()
        };
        let registry = PolicyRegistry::new(default)
            .with_method("GET", PolicyOverride::default().max_retries(4))
            .with_endpoint("/payments", PolicyOverride::default().max_retries(0));
        RetryManager::new(registry, options)
            .with_clock(Arc::new(ManualClock::new()))
            .with_sleeper(sleeper)
            .with_jitter(Arc::new(FixedJitter(0.5)))
    }

    fn ctx(id: &str) -> RequestContext {
        RequestContext::new("/orders", "POST").with_request_id(id)
    }

    #[tokio::test]
    async fn retryable_failure_uses_whole_budget() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));
        let calls = AtomicU32::new(0);

        let err = m
            .execute_with_retry(&ctx("r1"), None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Http { status: 503 }) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.retry_attempts, 3);
        assert_eq!(err.max_retries, 2);
        assert_eq!(err.request_id, "r1");
        assert_eq!(err.error, RequestError::Http { status: 503 });
        assert!(err.exhausted());
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
        assert!(m.retry_stats("r1").is_none());
    }

    #[tokio::test]
    async fn non_retryable_failure_short_circuits() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));
        let calls = AtomicU32::new(0);

        let err = m
            .execute_with_retry(&ctx("r2"), Some(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Http { status: 400 }) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.retry_attempts, 1);
        assert_eq!(err.max_retries, 10);
        assert!(!err.exhausted());
        assert!(sleeper.delays().is_empty());
        assert!(m.retry_stats("r2").is_none());
    }

    #[tokio::test]
    async fn success_after_transient_failures_clears_tracker() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));
        let calls = AtomicU32::new(0);

        let value = m
            .execute_with_retry(&ctx("r3"), None, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RequestError::network("TimeoutError", "read timed out"))
                    } else {
                        Ok("paid")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "paid");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays().len(), 2);
        assert!(m.retry_stats("r3").is_none());
        assert!(m.all_retry_stats().is_empty());
    }

    #[tokio::test]
    async fn override_replaces_policy_budget() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));
        let calls = AtomicU32::new(0);

        let err = m
            .execute_with_retry(&ctx("r4"), Some(0), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Other("network unreachable".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.retry_attempts, 1);
        assert!(err.exhausted());
    }

    #[tokio::test]
    async fn resolved_policy_drives_budget() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));
        let calls = AtomicU32::new(0);

        let get = RequestContext::new("/orders/7", "get");
        let err = m
            .execute_with_retry(&get, None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Http { status: 502 }) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(err.max_retries, 4);
        // Generated ids are used when none is supplied.
        assert!(err.request_id.starts_with("req_"));

        calls.store(0, Ordering::SeqCst);
        let pay = RequestContext::new("/payments/charge", "GET");
        let _ = m
            .execute_with_retry(&pay, None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Http { status: 502 }) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tracker_counts_attempts_while_in_flight() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = Arc::new(engine(Arc::clone(&sleeper)));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let probe = Arc::clone(&m);
        let log = Arc::clone(&seen);
        let result = m
            .execute_with_retry(&ctx("r5"), None, move || {
                let stats = probe.retry_stats("r5");
                log.lock().push(stats.map(|s| s.attempts));
                async { Err::<(), _>(RequestError::Http { status: 500 }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*seen.lock(), vec![Some(1), Some(2), Some(3)]);
        assert!(m.retry_stats("r5").is_none());
    }

    #[tokio::test]
    async fn non_retryable_failure_with_zero_budget_is_not_exhaustion() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));

        let err = m
            .execute_with_retry(&ctx("r6"), Some(0), || async {
                Err::<(), _>(RequestError::Http { status: 400 })
            })
            .await
            .unwrap_err();
        assert_eq!(err.retry_attempts, 1);
        assert!(!err.retryable);
        assert!(!err.exhausted());
    }

    #[tokio::test]
    async fn late_non_retryable_failure_is_not_exhaustion() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let m = engine(Arc::clone(&sleeper));
        let calls = AtomicU32::new(0);

        let err = m
            .execute_with_retry(&ctx("r7"), Some(2), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let status = if n < 2 { 503 } else { 400 };
                    Err::<(), _>(RequestError::Http { status })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.retry_attempts, 3);
        assert_eq!(err.error, RequestError::Http { status: 400 });
        assert!(!err.exhausted());
    }

    /// In-memory log sink shared with a scoped fmt subscriber.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    async fn failing_run_output(enable_logging: bool) -> String {
        let captured = CapturedLog::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        // Thread-local; the current-thread test runtime polls on this thread.
        let _guard = tracing::subscriber::set_default(subscriber);

        let options = ManagerOptions {
            enable_logging,
            ..ManagerOptions::default()
        };
        let m = engine_with(Arc::new(RecordingSleeper::new()), options);
        let _ = m
            .execute_with_retry(&ctx("r8"), None, || async {
                Err::<(), _>(RequestError::Http { status: 503 })
            })
            .await;
        captured.text()
    }

    #[tokio::test]
    async fn disabled_logging_emits_nothing() {
        let out = failing_run_output(false).await;
        assert!(out.is_empty(), "unexpected log output: {out}");
    }

    #[tokio::test]
    async fn enabled_logging_reports_retries_and_give_up() {
        let out = failing_run_output(true).await;
        assert!(out.contains("retrying request"), "{out}");
        assert!(out.contains("giving up"), "{out}");
        assert!(out.contains("r8"), "{out}");
    }
}

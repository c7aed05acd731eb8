//! `retrykit probe` – run a real request through the retry engine.

use anyhow::Result;
use retrykit_core::probe;
use retrykit_core::{RequestContext, RetryManager};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub async fn run_probe(
    manager: &Arc<RetryManager>,
    url: &str,
    method: &str,
    max_retries: Option<u32>,
    timeout_secs: u64,
) -> Result<()> {
    // Long runs with many retries still get stale trackers reclaimed.
    manager.start_sweeper();

    let ctx = RequestContext::new(url, method);
    let timeout = Duration::from_secs(timeout_secs.max(1));
    let attempts = AtomicU32::new(0);
    let started = Instant::now();

    let outcome = manager
        .execute_with_retry(&ctx, max_retries, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            probe::request_async(url, method, timeout)
        })
        .await;
    manager.destroy();

    let elapsed = started.elapsed().as_secs_f64();
    match outcome {
        Ok(resp) => {
            println!(
                "HTTP {} ({} bytes) after {} attempt(s) in {:.2}s",
                resp.status,
                resp.body_len,
                attempts.load(Ordering::Relaxed),
                elapsed
            );
            Ok(())
        }
        Err(err) => {
            tracing::warn!(request_id = %err.request_id, "probe failed: {}", err);
            anyhow::bail!("{} {} failed: {}", method.to_ascii_uppercase(), url, err)
        }
    }
}

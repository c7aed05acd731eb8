//! `retrykit delays` – print the backoff schedule for a request.

use anyhow::Result;
use retrykit_core::retry::{compute_delay, FixedJitter, JitterSource, ThreadRngJitter};
use retrykit_core::{RequestContext, RetryManager};

pub fn run_delays(manager: &RetryManager, url: &str, method: &str, no_jitter: bool) -> Result<()> {
    let policy = manager.resolve_policy(&RequestContext::new(url, method));
    if policy.max_retries == 0 {
        println!("No retries for {} {}.", method.to_ascii_uppercase(), url);
        return Ok(());
    }

    let fixed = FixedJitter(0.5);
    let jitter: &dyn JitterSource = if no_jitter {
        &fixed
    } else {
        &ThreadRngJitter
    };
    println!("{:<6} {:>10}", "RETRY", "DELAY_MS");
    let mut total = 0u128;
    for index in 0..policy.max_retries {
        let delay = compute_delay(index, &policy, jitter);
        total += delay.as_millis();
        println!("{:<6} {:>10}", index + 1, delay.as_millis());
    }
    println!("{:<6} {:>10}", "total", total);
    Ok(())
}

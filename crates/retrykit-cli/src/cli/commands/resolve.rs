//! `retrykit resolve` – show the effective policy for a request.

use anyhow::Result;
use retrykit_core::{RequestContext, RetryManager, RetryPolicy};

pub fn run_resolve(manager: &RetryManager, url: &str, method: &str) -> Result<()> {
    let ctx = RequestContext::new(url, method);
    let registry = manager.registry();
    let policy = manager.resolve_policy(&ctx);

    let method_layer = if registry.method_override(method).is_some() {
        method.to_ascii_uppercase()
    } else {
        "-".to_string()
    };
    let endpoint_layer = registry.matching_endpoint(url).unwrap_or("-");

    println!("{:<20} {}", "method override", method_layer);
    println!("{:<20} {}", "endpoint override", endpoint_layer);
    print_policy(&policy);
    Ok(())
}

pub(super) fn print_policy(policy: &RetryPolicy) {
    let statuses: Vec<String> = policy
        .retryable_statuses
        .iter()
        .map(|s| s.to_string())
        .collect();
    let errors: Vec<&str> = policy.retryable_errors.iter().map(String::as_str).collect();
    println!("{:<20} {}", "max_retries", policy.max_retries);
    println!("{:<20} {} ms", "base_delay", policy.base_delay.as_millis());
    println!("{:<20} {} ms", "max_delay", policy.max_delay.as_millis());
    println!("{:<20} {}", "backoff_multiplier", policy.backoff_multiplier);
    println!("{:<20} {}", "jitter_factor", policy.jitter_factor);
    println!("{:<20} {}", "retryable_statuses", statuses.join(","));
    println!("{:<20} {}", "retryable_errors", errors.join(","));
}

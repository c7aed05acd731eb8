//! Default policy plus method and endpoint overrides.

use std::collections::HashMap;

use super::{PolicyOverride, RetryPolicy};
use crate::request::RequestContext;

/// Layered retry configuration.
///
/// Resolution order is default, then method override, then the first
/// endpoint override whose key is a substring of the URL. Endpoint keys keep
/// their registration order so "first match" is deterministic.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    default: RetryPolicy,
    endpoints: Vec<(String, PolicyOverride)>,
    methods: HashMap<String, PolicyOverride>,
}

impl PolicyRegistry {
    pub fn new(default: RetryPolicy) -> Self {
        Self {
            default,
            endpoints: Vec::new(),
            methods: HashMap::new(),
        }
    }

    /// Register an endpoint override as given (no re-basing). Used while
    /// building the registry from configuration.
    pub fn with_endpoint(mut self, key: impl Into<String>, over: PolicyOverride) -> Self {
        self.put_endpoint(key.into(), over);
        self
    }

    /// Register a method override as given (no re-basing). The method is uppercased.
    pub fn with_method(mut self, method: &str, over: PolicyOverride) -> Self {
        self.methods.insert(method.to_ascii_uppercase(), over);
        self
    }

    pub fn default_policy(&self) -> &RetryPolicy {
        &self.default
    }

    pub fn endpoint_override(&self, key: &str) -> Option<&PolicyOverride> {
        self.endpoints
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, over)| over)
    }

    pub fn method_override(&self, method: &str) -> Option<&PolicyOverride> {
        self.methods.get(&method.to_ascii_uppercase())
    }

    /// Endpoint keys in registration order.
    pub fn endpoint_keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|(k, _)| k.as_str())
    }

    /// Resolve the effective policy for a request. Always computed fresh.
    pub fn resolve(&self, ctx: &RequestContext) -> RetryPolicy {
        let mut policy = self.default.clone();

        if !ctx.method.is_empty() {
            if let Some(over) = self.method_override(&ctx.method) {
                policy = policy.merged(over);
            }
        }

        if let Some(key) = self.matching_endpoint(&ctx.url) {
            if let Some(over) = self.endpoint_override(key) {
                policy = policy.merged(over);
            }
        }

        policy
    }

    /// First endpoint key (in registration order) contained in `url`.
    pub fn matching_endpoint(&self, url: &str) -> Option<&str> {
        if url.is_empty() {
            return None;
        }
        self.endpoint_keys().find(|key| url.contains(*key))
    }

    /// Replace the override for `key` with `partial` merged onto the default policy.
    ///
    /// The previous override for the key is discarded, not accumulated. An
    /// existing key keeps its position in the scan order; a new key goes last.
    pub fn update_endpoint_policy(&mut self, key: &str, partial: &PolicyOverride) {
        let rebased = partial.rebased_on(&self.default);
        self.put_endpoint(key.to_string(), rebased);
    }

    /// Replace the override for `method` with `partial` merged onto the default policy.
    pub fn update_method_policy(&mut self, method: &str, partial: &PolicyOverride) {
        let rebased = partial.rebased_on(&self.default);
        self.methods.insert(method.to_ascii_uppercase(), rebased);
    }

    fn put_endpoint(&mut self, key: String, over: PolicyOverride) {
        match self.endpoints.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = over,
            None => self.endpoints.push((key, over)),
        }
    }
}

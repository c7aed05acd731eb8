use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::{
    PolicyOverride, PolicyRegistry, RetryPolicy, DEFAULT_RETRYABLE_ERRORS,
    DEFAULT_RETRYABLE_STATUSES,
};
use crate::retry::ManagerOptions;

/// Full retry policy as written in config.toml (delays in milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub retryable_statuses: Vec<u16>,
    pub retryable_errors: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PolicyConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            retryable_statuses: self.retryable_statuses.iter().copied().collect(),
            retryable_errors: self.retryable_errors.iter().cloned().collect(),
        }
    }
}

/// Partial policy for a method or endpoint; omitted fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable_statuses: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable_errors: Option<Vec<String>>,
}

impl OverrideConfig {
    pub fn to_override(&self) -> PolicyOverride {
        PolicyOverride {
            max_retries: self.max_retries,
            base_delay: self.base_delay_ms.map(Duration::from_millis),
            max_delay: self.max_delay_ms.map(Duration::from_millis),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            retryable_statuses: self
                .retryable_statuses
                .as_ref()
                .map(|v| v.iter().copied().collect::<BTreeSet<u16>>()),
            retryable_errors: self
                .retryable_errors
                .as_ref()
                .map(|v| v.iter().cloned().collect::<BTreeSet<String>>()),
        }
    }

    fn validate(&self, what: &str) -> Result<()> {
        if let Some(m) = self.backoff_multiplier {
            check_multiplier(m).with_context(|| what.to_string())?;
        }
        if let Some(j) = self.jitter_factor {
            check_jitter(j).with_context(|| what.to_string())?;
        }
        Ok(())
    }
}

/// Endpoint override, matched by substring against the request URL.
/// Endpoints are scanned in file order and the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub pattern: String,
    #[serde(flatten)]
    pub policy: OverrideConfig,
}

/// Stale tracker sweep settings (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// How often the background sweep runs.
    pub sweep_interval_secs: u64,
    /// Tracker entries older than this are dropped.
    pub stale_after_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5 * 60,
            stale_after_secs: 10 * 60,
        }
    }
}

/// Global configuration loaded from `~/.config/retrykit/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryKitConfig {
    /// Emit tracing events for attempts, retries and final failures.
    pub enable_logging: bool,
    /// Policy applied when no override matches.
    pub default: PolicyConfig,
    pub tracking: TrackingConfig,
    /// Per-method overrides keyed by HTTP verb (any case).
    pub methods: BTreeMap<String, OverrideConfig>,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for RetryKitConfig {
    fn default() -> Self {
        let mut methods = BTreeMap::new();
        methods.insert(
            "GET".to_string(),
            OverrideConfig {
                max_retries: Some(5),
                ..OverrideConfig::default()
            },
        );
        methods.insert(
            "POST".to_string(),
            OverrideConfig {
                max_retries: Some(1),
                ..OverrideConfig::default()
            },
        );
        let endpoint = |pattern: &str, policy: OverrideConfig| EndpointConfig {
            pattern: pattern.to_string(),
            policy,
        };
        Self {
            enable_logging: true,
            default: PolicyConfig::default(),
            tracking: TrackingConfig::default(),
            methods,
            endpoints: vec![
                endpoint(
                    "/products/search",
                    OverrideConfig {
                        max_retries: Some(5),
                        backoff_multiplier: Some(1.5),
                        ..OverrideConfig::default()
                    },
                ),
                endpoint(
                    "/auth",
                    OverrideConfig {
                        max_retries: Some(1),
                        ..OverrideConfig::default()
                    },
                ),
                endpoint(
                    "/payments",
                    OverrideConfig {
                        max_retries: Some(0),
                        ..OverrideConfig::default()
                    },
                ),
            ],
        }
    }
}

impl RetryKitConfig {
    /// Reject values the backoff math cannot use.
    pub fn validate(&self) -> Result<()> {
        check_multiplier(self.default.backoff_multiplier).context("[default]")?;
        check_jitter(self.default.jitter_factor).context("[default]")?;
        let mut seen = BTreeSet::new();
        for (method, over) in &self.methods {
            if !seen.insert(method.to_ascii_uppercase()) {
                bail!("[methods.{method}]: method is already configured under a different case");
            }
            over.validate(&format!("[methods.{method}]"))?;
        }
        for ep in &self.endpoints {
            if ep.pattern.is_empty() {
                bail!("[[endpoints]]: pattern must not be empty");
            }
            ep.policy
                .validate(&format!("[[endpoints]] pattern = {:?}", ep.pattern))?;
        }
        if self.tracking.sweep_interval_secs == 0 {
            bail!("[tracking]: sweep_interval_secs must be greater than 0");
        }
        Ok(())
    }

    /// Build the policy registry, preserving endpoint order.
    pub fn build_registry(&self) -> Result<PolicyRegistry> {
        self.validate()?;
        let mut registry = PolicyRegistry::new(self.default.to_policy());
        for (method, over) in &self.methods {
            registry = registry.with_method(method, over.to_override());
        }
        for ep in &self.endpoints {
            registry = registry.with_endpoint(ep.pattern.clone(), ep.policy.to_override());
        }
        Ok(registry)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            enable_logging: self.enable_logging,
            stale_after: Duration::from_secs(self.tracking.stale_after_secs),
            sweep_interval: Duration::from_secs(self.tracking.sweep_interval_secs),
        }
    }
}

fn check_multiplier(m: f64) -> Result<()> {
    if !m.is_finite() || m <= 0.0 {
        bail!("backoff_multiplier must be a positive number, got {m}");
    }
    Ok(())
}

fn check_jitter(j: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&j) {
        bail!("jitter_factor must be within [0, 1], got {j}");
    }
    Ok(())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("retrykit")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RetryKitConfig> {
    load_or_init_at(&config_path()?)
}

/// Like `load_or_init` but for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<RetryKitConfig> {
    if !path.exists() {
        let default_cfg = RetryKitConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: RetryKitConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

//! CLI for the retrykit retry policy engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use retrykit_core::config;
use retrykit_core::RetryManager;
use std::sync::Arc;

use commands::{run_config_path, run_delays, run_probe, run_resolve};

/// Top-level CLI for retrykit.
#[derive(Debug, Parser)]
#[command(name = "retrykit")]
#[command(about = "retrykit: layered HTTP retry policies with backoff and jitter", long_about = None)]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show the policy that applies to a request.
    Resolve {
        /// Request URL (absolute or path).
        url: String,
        /// HTTP method.
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,
    },

    /// Show the delay before each retry the resolved policy allows.
    Delays {
        /// Request URL (absolute or path).
        url: String,
        /// HTTP method.
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,
        /// Print pre-jitter delays instead of a random draw.
        #[arg(long)]
        no_jitter: bool,
    },

    /// Send a real HTTP request through the retry engine.
    Probe {
        /// Absolute HTTP/HTTPS URL.
        url: String,
        /// HTTP method.
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,
        /// Override the policy's retry budget.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
        /// Per-attempt timeout.
        #[arg(long, default_value = "30", value_name = "SECS")]
        timeout_secs: u64,
    },

    /// Print the location of config.toml.
    ConfigPath,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let CliCommand::ConfigPath = self.command {
            return run_config_path();
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let manager = Arc::new(RetryManager::from_config(&cfg)?);

        match self.command {
            CliCommand::Resolve { url, method } => run_resolve(&manager, &url, &method),
            CliCommand::Delays {
                url,
                method,
                no_jitter,
            } => run_delays(&manager, &url, &method, no_jitter),
            CliCommand::Probe {
                url,
                method,
                max_retries,
                timeout_secs,
            } => run_probe(&manager, &url, &method, max_retries, timeout_secs).await,
            CliCommand::ConfigPath => run_config_path(),
        }
    }
}

#[cfg(test)]
mod tests;

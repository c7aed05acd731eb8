//! CLI command handlers, one per file.

mod config_path;
mod delays;
mod probe;
mod resolve;

pub use config_path::run_config_path;
pub use delays::run_delays;
pub use probe::run_probe;
pub use resolve::run_resolve;

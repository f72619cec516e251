//! Diagnostic logging.
//!
//! Diagnostics go to stderr through `tracing`. Nothing in here may be called
//! from a signal handler; the signal path uses raw writes instead.

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

const DEFAULT_FILTER: &str = "warn";

/// Resolve the log filter: `RUST_LOG`, then `SH_INTERRUPT_LOG`, then `warn`.
pub fn log_filter(config: &EnvConfig) -> EnvFilter {
    let level = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| config.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: &EnvConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

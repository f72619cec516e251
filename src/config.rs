//! Environment configuration.

use std::env;
use std::path::PathBuf;

/// Controlling terminal device opened when `SH_INTERRUPT_TTY` is unset.
pub const DEFAULT_TTY_PATH: &str = "/dev/tty";

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub tty_path: PathBuf,
    pub verbose: bool,
    pub legacy_exit_status: bool,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            tty_path: env_string_opt("SH_INTERRUPT_TTY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TTY_PATH)),
            verbose: env_flag("SH_INTERRUPT_VERBOSE"),
            legacy_exit_status: env_flag("SH_INTERRUPT_LEGACY_EXIT"),
            log_filter: env_string_opt("SH_INTERRUPT_LOG"),
        }
    }

    /// Exit status for a failure with the given per-kind code.
    pub fn failure_status(&self, code: i32) -> i32 {
        if self.legacy_exit_status {
            0
        } else {
            code
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

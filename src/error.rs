use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatcherError {
    #[error("open {path}: {source}")]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("terminal session already holds an open device")]
    SessionBusy,

    #[error("tcgetattr on terminal: {0}")]
    AttributeQueryFailed(#[source] std::io::Error),

    #[error("tcsetattr on terminal: {0}")]
    AttributeSetFailed(#[source] std::io::Error),

    #[error("{operation} on terminal: {source}")]
    ProcessGroupError {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install handler for {signal}: {source}")]
    SignalInstallFailed {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("read from terminal: {0}")]
    ReadFailed(#[source] std::io::Error),
}

impl CatcherError {
    #[must_use]
    pub fn device(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn process_group(operation: &'static str, source: std::io::Error) -> Self {
        Self::ProcessGroupError { operation, source }
    }

    /// Process exit status reported for this failure.
    ///
    /// Each kind maps to its own nonzero code. Callers running with the legacy
    /// exit policy ignore this and always exit 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DeviceUnavailable { .. } => 2,
            Self::SessionBusy => 3,
            Self::AttributeQueryFailed(_) => 4,
            Self::ProcessGroupError { .. } => 5,
            Self::AttributeSetFailed(_) => 6,
            Self::SignalInstallFailed { .. } => 7,
            Self::ReadFailed(_) => 8,
        }
    }
}

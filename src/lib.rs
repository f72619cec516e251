//! Raw-mode terminal session that survives asynchronous signals.
//!
//! Invariant: every exit path restores the terminal's original mode at most once, either
//! through [`SessionGuard`] drop or through the terminate-bound signal handler, and both go
//! through [`TerminalSession::teardown`].
//!
//! # Overview
//! - [`platform::tty_session`] owns the device, the saved mode, and teardown.
//! - [`platform::signals`] routes SIGINT/SIGQUIT to a notify write and SIGHUP/SIGTERM to
//!   teardown-and-exit.
//! - [`crate::core::read_loop`] reads one byte at a time and reports how input ended.

#[cfg(not(unix))]
compile_error!("sh_interrupt drives termios and POSIX signals and only builds on Unix");

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;

pub use crate::config::EnvConfig;
pub use crate::core::read_loop::{EndOfInput, LoopExit};
pub use crate::error::CatcherError;
pub use crate::platform::{
    install_panic_restore, Restore, SessionGuard, Teardown, TerminalSession, SESSION,
};

//! Unix terminal and signal integrations.

pub mod signals;
pub mod tty_session;

pub use tty_session::{
    hold_teardown_signals, install_panic_restore, working_mode, Restore, SessionGuard, Teardown, TerminalSession,
    SESSION,
};

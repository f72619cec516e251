//! Signal routing: a fixed table from signal to behavior, and the two handlers behind it.
//!
//! Both handlers run in signal context. They use raw `write(2)`, stack buffers, the session's
//! teardown and `_exit`, and nothing else.

use std::io;

use libc::{self, c_int};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::low_level;

use crate::error::CatcherError;
use crate::platform::tty_session::{Restore, TerminalSession, SESSION, TEARDOWN_SIGNALS};

const NOTIFY_SIGNALS: [c_int; 2] = [SIGINT, SIGQUIT];

/// Exit status used when a terminate-bound signal ends the process.
const SIGNAL_EXIT_STATUS: c_int = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Write the message to stdout and resume.
    Notify(&'static [u8]),
    /// Tear the session down and exit.
    Terminate,
}

impl Behavior {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Notify(_) => "notify",
            Self::Terminate => "terminate",
        }
    }
}

pub const ROUTES: [(c_int, Behavior); 4] = [
    (SIGINT, Behavior::Notify(b"Async action on sigint (2)\n")),
    (SIGQUIT, Behavior::Notify(b"Async action on sigquit (3)\n")),
    (SIGHUP, Behavior::Terminate),
    (SIGTERM, Behavior::Terminate),
];

pub fn behavior_for(signal: c_int) -> Option<Behavior> {
    ROUTES
        .iter()
        .find(|(routed, _)| *routed == signal)
        .map(|(_, behavior)| *behavior)
}

pub fn signal_label(signal: c_int) -> &'static str {
    low_level::signal_name(signal).unwrap_or("unknown signal")
}

/// Register every route. Handlers are installed without `SA_RESTART`, so a blocked read
/// returns `EINTR` after a notify and the read loop retries it.
pub fn install() -> Result<(), CatcherError> {
    for (signal, behavior) in ROUTES {
        install_route(signal, behavior)?;
        tracing::debug!(
            signal = signal_label(signal),
            behavior = behavior.label(),
            "signal handler registered"
        );
    }
    Ok(())
}

/// Notify handlers never interleave their writes; terminate handlers never nest.
fn masked_during(behavior: Behavior) -> &'static [c_int] {
    match behavior {
        Behavior::Notify(_) => &NOTIFY_SIGNALS,
        Behavior::Terminate => &TEARDOWN_SIGNALS,
    }
}

fn install_route(signal: c_int, behavior: Behavior) -> Result<(), CatcherError> {
    let handler: extern "C" fn(c_int) = match behavior {
        Behavior::Notify(_) => notify_handler,
        Behavior::Terminate => terminate_handler,
    };

    let result = unsafe {
        let mut action = std::mem::zeroed::<libc::sigaction>();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        for blocked in masked_during(behavior) {
            libc::sigaddset(&mut action.sa_mask, *blocked);
        }
        libc::sigaction(signal, &action, std::ptr::null_mut())
    };

    if result != 0 {
        return Err(CatcherError::SignalInstallFailed {
            signal: signal_label(signal),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

extern "C" fn notify_handler(signal: c_int) {
    if let Some(Behavior::Notify(message)) = behavior_for(signal) {
        write_best_effort(libc::STDOUT_FILENO, message);
    }
}

extern "C" fn terminate_handler(signal: c_int) {
    terminate_from_signal(&SESSION, signal)
}

fn terminate_from_signal(session: &TerminalSession, signal: c_int) -> ! {
    match session.teardown().restore {
        Restore::Restored => write_best_effort(libc::STDOUT_FILENO, b"Resetting terminal\n"),
        Restore::Failed(errno) => {
            let mut buf = [0u8; 64];
            let len = notice(b"tcsetattr restore on terminal failed: errno ", errno, &mut buf);
            write_best_effort(libc::STDERR_FILENO, &buf[..len]);
        }
        Restore::NotArmed => {}
    }

    let mut buf = [0u8; 64];
    let len = notice(b"Exiting on signal ", signal, &mut buf);
    write_best_effort(libc::STDOUT_FILENO, &buf[..len]);

    low_level::exit(SIGNAL_EXIT_STATUS)
}

/// `prefix`, `value` in decimal, and a newline, formatted without allocating.
fn notice(prefix: &[u8], value: c_int, buf: &mut [u8; 64]) -> usize {
    let mut digits = [0u8; 10];
    let mut count = 0;
    let mut rest = value.unsigned_abs();
    loop {
        digits[count] = b'0' + (rest % 10) as u8;
        count += 1;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }

    let prefix = &prefix[..prefix.len().min(buf.len() - digits.len() - 2)];
    let mut len = prefix.len();
    buf[..len].copy_from_slice(prefix);
    if value < 0 {
        buf[len] = b'-';
        len += 1;
    }
    for digit in digits[..count].iter().rev() {
        buf[len] = *digit;
        len += 1;
    }
    buf[len] = b'\n';
    len + 1
}

/// Raw write of `bytes`, retrying on `EINTR` and dropping the rest on any other failure.
pub(crate) fn write_best_effort(fd: c_int, bytes: &[u8]) {
    let mut written = 0;
    while written < bytes.len() {
        let remaining = &bytes[written..];
        let result = unsafe {
            libc::write(
                fd,
                remaining.as_ptr() as *const libc::c_void,
                remaining.len(),
            )
        };
        if result > 0 {
            written = written.saturating_add(result as usize);
            continue;
        }
        if result == 0 {
            break;
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        break;
    }
}

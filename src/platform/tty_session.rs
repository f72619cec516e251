//! Process-wide terminal session: device handle, saved mode, and teardown.
//!
//! Invariant: [`TerminalSession::teardown`] touches only atomics, `tcsetattr` and `close`, so
//! it may run inside a signal handler. Everything that logs or allocates lives outside it.

use std::fs::File;
use std::io::{self, Write};
use std::ops::Deref;
use std::os::fd::IntoRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use libc::{self, c_int};
use once_cell::sync::OnceCell;
use signal_hook::consts::signal::{SIGHUP, SIGTERM};

use crate::error::CatcherError;

/// Signals whose handlers tear the session down. Blocked while the main path does the same.
pub const TEARDOWN_SIGNALS: [c_int; 2] = [SIGHUP, SIGTERM];

const fn ctrl(c: u8) -> u8 {
    c & 0o37
}

/// Quit character installed in raw mode (`Ctrl-G`).
pub const QUIT_SENTINEL: u8 = ctrl(b'g');

/// End-of-input character used when the terminal has none configured (`Ctrl-D`).
pub const EOF_FALLBACK: u8 = ctrl(b'd');

const NO_DEVICE: c_int = -1;

/// The one session the signal handlers know about.
pub static SESSION: TerminalSession = TerminalSession::new();

pub(crate) fn get_termios(fd: c_int) -> io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

pub(crate) fn set_termios(fd: c_int, termios: &libc::termios) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Working mode derived from `original`: no canonical input, no echo, quit on `Ctrl-G`.
pub fn working_mode(original: &libc::termios) -> libc::termios {
    let mut raw = *original;
    raw.c_lflag &= !(libc::ICANON | libc::ECHO);
    raw.c_cc[libc::VQUIT] = QUIT_SENTINEL as libc::cc_t;
    raw
}

/// What teardown did to the saved mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// Raw mode was never applied, or another teardown already ran.
    NotArmed,
    Restored,
    /// `tcsetattr` failed with this errno.
    Failed(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Teardown {
    pub restore: Restore,
    pub closed: bool,
}

impl Teardown {
    pub fn is_noop(&self) -> bool {
        self.restore == Restore::NotArmed && !self.closed
    }
}

pub struct TerminalSession {
    fd: AtomicI32,
    original: OnceCell<libc::termios>,
    armed: AtomicBool,
}

impl TerminalSession {
    pub const fn new() -> Self {
        Self {
            fd: AtomicI32::new(NO_DEVICE),
            original: OnceCell::new(),
            armed: AtomicBool::new(false),
        }
    }

    /// Open `path` read-only and take ownership of the descriptor.
    pub fn acquire(&self, path: &Path) -> Result<SessionGuard<'_>, CatcherError> {
        let file = File::open(path).map_err(|err| CatcherError::device(path, err))?;
        self.attach(file.into_raw_fd())
    }

    /// Take ownership of an already-open terminal descriptor.
    pub fn attach(&self, fd: c_int) -> Result<SessionGuard<'_>, CatcherError> {
        if self
            .fd
            .compare_exchange(NO_DEVICE, fd, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            unsafe {
                libc::close(fd);
            }
            return Err(CatcherError::SessionBusy);
        }
        tracing::debug!(fd, "terminal device attached");
        Ok(SessionGuard { session: self })
    }

    pub fn device_fd(&self) -> Option<c_int> {
        let fd = self.fd.load(Ordering::SeqCst);
        (fd >= 0).then_some(fd)
    }

    fn require_fd(&self) -> io::Result<c_int> {
        self.device_fd()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn original_mode(&self) -> Option<&libc::termios> {
        self.original.get()
    }

    /// Capture the terminal's current attributes. Only the first capture is kept.
    pub fn snapshot_original_mode(&self) -> Result<&libc::termios, CatcherError> {
        let fd = self.require_fd().map_err(CatcherError::AttributeQueryFailed)?;
        self.original
            .get_or_try_init(|| get_termios(fd))
            .map_err(CatcherError::AttributeQueryFailed)
    }

    /// Read the foreground process group and hand it straight back to the terminal.
    pub fn claim_foreground_group(&self) -> Result<libc::pid_t, CatcherError> {
        let fd = self
            .require_fd()
            .map_err(|err| CatcherError::process_group("tcgetpgrp", err))?;

        let pgrp = unsafe { libc::tcgetpgrp(fd) };
        if pgrp < 0 {
            return Err(CatcherError::process_group(
                "tcgetpgrp",
                io::Error::last_os_error(),
            ));
        }
        if unsafe { libc::tcsetpgrp(fd, pgrp) } < 0 {
            return Err(CatcherError::process_group(
                "tcsetpgrp",
                io::Error::last_os_error(),
            ));
        }
        Ok(pgrp)
    }

    /// Apply the working mode and arm cleanup. Applying twice is a no-op.
    pub fn enter_raw_mode(&self) -> Result<(), CatcherError> {
        if self.is_armed() {
            return Ok(());
        }
        let fd = self.require_fd().map_err(CatcherError::AttributeSetFailed)?;
        let original = self.original.get().ok_or_else(|| {
            CatcherError::AttributeSetFailed(io::Error::other("original mode was never captured"))
        })?;

        self.enter_raw_mode_with(fd, original, set_termios)
    }

    pub(crate) fn enter_raw_mode_with<W>(
        &self,
        fd: c_int,
        original: &libc::termios,
        mut write_mode: W,
    ) -> Result<(), CatcherError>
    where
        W: FnMut(c_int, &libc::termios) -> io::Result<()>,
    {
        // A teardown signal between the mode change and the flag would skip the restore.
        let _blocked = BlockedSignals::new(&TEARDOWN_SIGNALS);
        write_mode(fd, &working_mode(original)).map_err(CatcherError::AttributeSetFailed)?;
        self.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// End-of-input character from the saved mode, or `Ctrl-D` when it is disabled.
    pub fn eof_char(&self) -> u8 {
        self.original
            .get()
            .map(|termios| termios.c_cc[libc::VEOF] as u8)
            .filter(|c| *c != 0 && *c != 0xff)
            .unwrap_or(EOF_FALLBACK)
    }

    /// One blocking `read(2)` of a single byte from the device.
    pub fn read_byte(&self, buf: &mut [u8; 1]) -> io::Result<usize> {
        let fd = self.require_fd()?;
        let read_len = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
        if read_len < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(read_len as usize)
        }
    }

    /// Restore the saved mode if armed, then close the device. Safe to repeat and safe in
    /// signal context.
    pub fn teardown(&self) -> Teardown {
        self.teardown_with(
            |fd, original| set_termios(fd, original),
            |fd| unsafe {
                libc::close(fd);
            },
        )
    }

    pub(crate) fn teardown_with<R, C>(&self, mut write_mode: R, mut close: C) -> Teardown
    where
        R: FnMut(c_int, &libc::termios) -> io::Result<()>,
        C: FnMut(c_int),
    {
        // The flag is cleared before the restore so a racing teardown never writes twice.
        let restore = if self.armed.swap(false, Ordering::SeqCst) {
            match (self.device_fd(), self.original.get()) {
                (Some(fd), Some(original)) => match write_mode(fd, original) {
                    Ok(()) => Restore::Restored,
                    Err(err) => Restore::Failed(err.raw_os_error().unwrap_or(0)),
                },
                _ => Restore::NotArmed,
            }
        } else {
            Restore::NotArmed
        };

        let fd = self.fd.swap(NO_DEVICE, Ordering::SeqCst);
        let closed = fd >= 0;
        if closed {
            close(fd);
        }

        Teardown { restore, closed }
    }
}

impl Default for TerminalSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks a set of signals for the calling thread until dropped.
struct BlockedSignals {
    previous: libc::sigset_t,
}

impl BlockedSignals {
    fn new(signals: &[c_int]) -> Self {
        unsafe {
            let mut set = std::mem::zeroed::<libc::sigset_t>();
            let mut previous = std::mem::zeroed::<libc::sigset_t>();
            libc::sigemptyset(&mut set);
            for signal in signals {
                libc::sigaddset(&mut set, *signal);
            }
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous);
            Self { previous }
        }
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut());
        }
    }
}

/// Block the teardown signals for the calling thread from now on. Used on the way to exit,
/// so a late SIGHUP or SIGTERM cannot replace the exit status.
pub fn hold_teardown_signals() {
    std::mem::forget(BlockedSignals::new(&TEARDOWN_SIGNALS));
}

/// Scoped ownership of the session's device. Dropping it tears the session down.
pub struct SessionGuard<'a> {
    session: &'a TerminalSession,
}

impl Deref for SessionGuard<'_> {
    type Target = TerminalSession;

    fn deref(&self) -> &TerminalSession {
        self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let outcome = {
            let _blocked = BlockedSignals::new(&TEARDOWN_SIGNALS);
            self.session.teardown()
        };

        match outcome.restore {
            Restore::Restored => {
                let _ = writeln!(io::stdout(), "Resetting terminal");
            }
            Restore::Failed(errno) => {
                tracing::error!(
                    "tcsetattr restore on terminal: {}",
                    io::Error::from_raw_os_error(errno)
                );
            }
            Restore::NotArmed => {}
        }
        tracing::debug!(closed = outcome.closed, "terminal session torn down");
    }
}

/// Chain a panic hook that restores `session` before the previous hook reports the panic.
pub fn install_panic_restore(session: &'static TerminalSession) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = session.teardown();
        previous(info);
    }));
}

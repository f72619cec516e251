#![allow(dead_code)]

use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use libc::{self, c_int};
use wait_timeout::ChildExt;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Pty {
    pub master: c_int,
    pub slave: c_int,
}

impl Drop for Pty {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.master);
            libc::close(self.slave);
        }
    }
}

fn set_cloexec(fd: c_int) {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    assert!(flags >= 0, "fcntl(F_GETFD) failed");
    let result = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    assert!(result >= 0, "fcntl(F_SETFD) failed");
}

pub fn open_pty() -> Pty {
    let mut master: c_int = 0;
    let mut slave: c_int = 0;
    let result = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    assert_eq!(result, 0, "openpty failed");
    set_cloexec(master);
    set_cloexec(slave);
    Pty { master, slave }
}

pub fn get_termios(fd: c_int) -> libc::termios {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    assert_eq!(result, 0, "tcgetattr failed");
    termios
}

pub fn assert_same_mode(actual: &libc::termios, expected: &libc::termios) {
    assert_eq!(actual.c_iflag, expected.c_iflag, "c_iflag differs");
    assert_eq!(actual.c_oflag, expected.c_oflag, "c_oflag differs");
    assert_eq!(actual.c_cflag, expected.c_cflag, "c_cflag differs");
    assert_eq!(actual.c_lflag, expected.c_lflag, "c_lflag differs");
    assert_eq!(actual.c_cc, expected.c_cc, "c_cc differs");
}

fn dup_owned(fd: c_int) -> OwnedFd {
    let copy = unsafe { libc::dup(fd) };
    assert!(copy >= 0, "dup failed");
    unsafe { OwnedFd::from_raw_fd(copy) }
}

/// A running `catcher` process. Killed on drop if it is still alive.
pub struct Catcher {
    child: Child,
}

impl Catcher {
    /// Spawn `catcher` in a new session whose controlling terminal is `pty`.
    pub fn spawn_on(pty: &Pty, envs: &[(&str, &str)]) -> Self {
        let mut command = Command::new(env!("CARGO_BIN_EXE_catcher"));
        command
            .stdin(Stdio::from(dup_owned(pty.slave)))
            .stdout(Stdio::from(dup_owned(pty.slave)))
            .stderr(Stdio::null())
            .env_remove("RUST_LOG")
            .env_remove("SH_INTERRUPT_TTY")
            .env_remove("SH_INTERRUPT_VERBOSE")
            .env_remove("SH_INTERRUPT_LEGACY_EXIT")
            .env("SH_INTERRUPT_LOG", "off")
            .envs(envs.iter().copied());

        unsafe {
            command.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().expect("spawn catcher");
        Self { child }
    }

    /// Spawn `catcher` without a terminal of its own.
    pub fn spawn_detached(envs: &[(&str, &str)]) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_catcher"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .env_remove("RUST_LOG")
            .env_remove("SH_INTERRUPT_VERBOSE")
            .env_remove("SH_INTERRUPT_LEGACY_EXIT")
            .env("SH_INTERRUPT_LOG", "off")
            .envs(envs.iter().copied())
            .spawn()
            .expect("spawn catcher");
        Self { child }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn signal(&self, signal: c_int) {
        let result = unsafe { libc::kill(self.child.id() as libc::pid_t, signal) };
        assert_eq!(result, 0, "kill failed");
    }

    pub fn wait_exit(&mut self) -> ExitStatus {
        self.child
            .wait_timeout(TIMEOUT)
            .expect("wait on catcher")
            .expect("catcher did not exit in time")
    }
}

impl Drop for Catcher {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

pub fn type_bytes(pty: &Pty, bytes: &[u8]) {
    let written =
        unsafe { libc::write(pty.master, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    assert_eq!(written, bytes.len() as isize, "short write to pty master");
}

fn poll_readable(fd: c_int, timeout_ms: i32) -> bool {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let result = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    result > 0 && (fds.revents & libc::POLLIN) != 0
}

/// Everything the child has written to the terminal so far.
pub struct Transcript {
    fd: c_int,
    bytes: Vec<u8>,
}

impl Transcript {
    pub fn new(pty: &Pty) -> Self {
        Self {
            fd: pty.master,
            bytes: Vec::new(),
        }
    }

    fn find(&self, needle: &str) -> Option<usize> {
        self.bytes
            .windows(needle.len())
            .position(|window| window == needle.as_bytes())
    }

    /// Offset of the first occurrence of `needle`, reading more output until it shows up.
    pub fn wait_for(&mut self, needle: &str) -> usize {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if let Some(position) = self.find(needle) {
                return position;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                panic!(
                    "timed out waiting for {needle:?}; transcript: {:?}",
                    String::from_utf8_lossy(&self.bytes)
                );
            }
            let timeout_ms = remaining.as_millis().min(i32::MAX as u128) as i32;
            if !poll_readable(self.fd, timeout_ms) {
                continue;
            }
            let mut buf = [0u8; 1024];
            let read_len = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if read_len > 0 {
                self.bytes.extend_from_slice(&buf[..read_len as usize]);
            } else {
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    pub fn count(&self, needle: &str) -> usize {
        self.bytes
            .windows(needle.len())
            .filter(|window| *window == needle.as_bytes())
            .count()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

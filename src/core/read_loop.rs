//! Byte-at-a-time read loop over the session device.

use std::io::{self, Write};

use crate::error::CatcherError;

/// How the input ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfInput {
    /// `read` returned zero bytes.
    ZeroRead,
    /// The end-of-input control character arrived as data.
    ControlChar,
}

#[derive(Debug)]
pub enum LoopExit {
    EndOfInput(EndOfInput),
    ReadFailed(io::Error),
}

impl LoopExit {
    pub fn into_result(self) -> Result<EndOfInput, CatcherError> {
        match self {
            Self::EndOfInput(end) => Ok(end),
            Self::ReadFailed(err) => Err(CatcherError::ReadFailed(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteClass {
    EndOfInput,
    Typed(u8),
}

pub fn classify(byte: u8, eof_char: u8) -> ByteClass {
    if byte == eof_char {
        ByteClass::EndOfInput
    } else {
        ByteClass::Typed(byte)
    }
}

/// Caret-style name for a control character, e.g. `C-d` for 0x04.
pub fn control_name(byte: u8) -> String {
    match byte {
        0x01..=0x1a => format!("C-{}", char::from(byte + 0x60)),
        0x00 | 0x1b..=0x1f => format!("C-{}", char::from(byte ^ 0x40)),
        _ => format!("0x{byte:02X}"),
    }
}

fn echo(out: &mut impl Write, byte: u8) -> io::Result<()> {
    out.write_all(b"You typed: '")?;
    out.write_all(&[byte])?;
    writeln!(out, "' (0x{byte:X})")?;
    out.flush()
}

/// Read until end of input or an unrecoverable error.
///
/// `EINTR` is retried silently. Echo output is best-effort; a failing `out` never stops
/// the loop.
pub fn run<R, W>(mut read_byte: R, eof_char: u8, out: &mut W) -> LoopExit
where
    R: FnMut(&mut [u8; 1]) -> io::Result<usize>,
    W: Write,
{
    let mut buf = [0u8; 1];
    loop {
        match read_byte(&mut buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                tracing::trace!("read interrupted by signal, retrying");
                continue;
            }
            Err(err) => return LoopExit::ReadFailed(err),
            Ok(0) => {
                let _ = writeln!(out, "Exiting on stdin EOF (zero-length read)");
                return LoopExit::EndOfInput(EndOfInput::ZeroRead);
            }
            Ok(_) => match classify(buf[0], eof_char) {
                ByteClass::EndOfInput => {
                    let _ = writeln!(out, "Exiting on stdin EOF (end-of-input character)");
                    return LoopExit::EndOfInput(EndOfInput::ControlChar);
                }
                ByteClass::Typed(byte) => {
                    tracing::trace!(byte, "byte read");
                    let _ = echo(out, byte);
                }
            },
        }
    }
}

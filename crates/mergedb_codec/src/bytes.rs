//! Byte-level read primitives and diagnostics.

use crate::error::{CodecError, CodecResult};
use std::fmt::Write;

/// A forward-only reader over a byte slice.
///
/// Length-prefixed items use a one-byte prefix, so each is at most 255
/// bytes long.
///
/// # Example
///
/// ```
/// use mergedb_codec::Decoder;
///
/// let mut decoder = Decoder::new(b"h\x03keyrest");
/// decoder.skip(1).unwrap();
/// assert_eq!(decoder.read_len_prefixed().unwrap(), b"key");
/// assert_eq!(decoder.remaining(), b"rest");
/// ```
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Advances past `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Truncated` if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> CodecResult<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Truncated` at end of input.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Truncated` if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if n > available {
            return Err(CodecError::truncated(n, available));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads a one-byte length followed by that many bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Truncated` if the prefix or the data is cut short.
    pub fn read_len_prefixed(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    /// Reads one byte and checks it equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Malformed` on a mismatch.
    pub fn expect_u8(&mut self, expected: u8) -> CodecResult<()> {
        let found = self.read_u8()?;
        if found != expected {
            return Err(CodecError::malformed(format!(
                "expected byte 0x{expected:02x} at offset {}, found 0x{found:02x}",
                self.pos - 1
            )));
        }
        Ok(())
    }

    /// Returns the unread bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns true once every byte has been read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the current offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Appends a one-byte length prefix and the data.
///
/// # Errors
///
/// Returns `CodecError::TooLong` if `data` is longer than 255 bytes.
pub fn write_len_prefixed(buf: &mut Vec<u8>, what: &'static str, data: &[u8]) -> CodecResult<()> {
    let len = u8::try_from(data.len()).map_err(|_| CodecError::TooLong {
        what,
        len: data.len(),
        max: usize::from(u8::MAX),
    })?;
    buf.push(len);
    buf.extend_from_slice(data);
    Ok(())
}

/// Renders bytes for logs: printable ASCII as-is, `\r \n \t \\` escaped,
/// everything else as `\xHH`.
///
/// ```
/// use mergedb_codec::hexmem;
///
/// assert_eq!(hexmem(b"h\x03key\n"), "h\\x03key\\n");
/// ```
#[must_use]
pub fn hexmem(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out
}

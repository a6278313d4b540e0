//! Replication log entries.
//!
//! ## Wire format
//!
//! ```text
//! | seq(8, little-endian) | kind(1) | command(1) | key(variable) |
//! ```

use crate::bytes::hexmem;
use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Fixed header length: seq + kind + command.
pub const HEADER_LEN: usize = 10;

/// How a log entry reached this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinlogKind {
    /// Placeholder entry with no effect.
    Noop = 0,
    /// Written by a client of this node.
    Sync = 1,
    /// Replayed from a mirror peer.
    Mirror = 2,
    /// Produced by a full copy.
    Copy = 3,
    /// Control message.
    Ctrl = 4,
}

impl BinlogKind {
    /// Parses a kind byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Noop),
            1 => Some(Self::Sync),
            2 => Some(Self::Mirror),
            3 => Some(Self::Copy),
            4 => Some(Self::Ctrl),
            _ => None,
        }
    }

    /// Returns the kind byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Sync => "sync",
            Self::Mirror => "mirror",
            Self::Copy => "copy",
            Self::Ctrl => "control",
        }
    }
}

/// The mutation a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinlogCommand {
    /// No mutation.
    None = 0,
    /// Key set.
    KSet = 1,
    /// Key delete.
    KDel = 2,
    /// Hash field set.
    HSet = 3,
    /// Hash field delete.
    HDel = 4,
    /// Sorted-set add.
    ZSet = 5,
    /// Sorted-set remove.
    ZDel = 6,
    /// Start of a replicated batch.
    Begin = 7,
    /// End of a replicated batch.
    End = 8,
    /// Queue push at the back.
    QPushBack = 10,
    /// Queue push at the front.
    QPushFront = 11,
    /// Queue pop from the back.
    QPopBack = 12,
    /// Queue pop from the front.
    QPopFront = 13,
    /// Queue item set.
    QSet = 14,
}

impl BinlogCommand {
    /// Parses a command byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::KSet),
            2 => Some(Self::KDel),
            3 => Some(Self::HSet),
            4 => Some(Self::HDel),
            5 => Some(Self::ZSet),
            6 => Some(Self::ZDel),
            7 => Some(Self::Begin),
            8 => Some(Self::End),
            10 => Some(Self::QPushBack),
            11 => Some(Self::QPushFront),
            12 => Some(Self::QPopBack),
            13 => Some(Self::QPopFront),
            14 => Some(Self::QSet),
            _ => None,
        }
    }

    /// Returns the command byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::KSet => "set",
            Self::KDel => "del",
            Self::HSet => "hset",
            Self::HDel => "hdel",
            Self::ZSet => "zset",
            Self::ZDel => "zdel",
            Self::Begin => "begin",
            Self::End => "end",
            Self::QPushBack => "qpush_back",
            Self::QPushFront => "qpush_front",
            Self::QPopBack => "qpop_back",
            Self::QPopFront => "qpop_front",
            Self::QSet => "qset",
        }
    }
}

/// One replication log entry, kept in its encoded form.
///
/// Accessors read the buffer directly; nothing is parsed twice.
///
/// # Example
///
/// ```
/// use mergedb_codec::{BinlogCommand, BinlogKind, LogEntry};
///
/// let entry = LogEntry::new(7, BinlogKind::Sync, BinlogCommand::HSet, b"h\x01k");
/// let decoded = LogEntry::decode(entry.as_bytes()).unwrap();
/// assert_eq!(decoded.seq(), 7);
/// assert_eq!(decoded.command(), Some(BinlogCommand::HSet));
/// assert_eq!(decoded.to_string(), "7 sync hset h\\x01k");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LogEntry {
    buf: Vec<u8>,
}

impl LogEntry {
    /// Lays out a new entry.
    #[must_use]
    pub fn new(seq: u64, kind: BinlogKind, command: BinlogCommand, key: &[u8]) -> Self {
        Self::from_raw(seq, kind.as_byte(), command.as_byte(), key)
    }

    /// Lays out an entry from raw kind and command bytes.
    #[must_use]
    pub fn from_raw(seq: u64, kind: u8, command: u8, key: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(HEADER_LEN + key.len());
        buf.extend_from_slice(&seq.to_le_bytes());
        buf.push(kind);
        buf.push(command);
        buf.extend_from_slice(key);
        Self { buf }
    }

    /// Wraps encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Truncated` if `bytes` is shorter than the header.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::truncated(HEADER_LEN, bytes.len()));
        }
        Ok(Self {
            buf: bytes.to_vec(),
        })
    }

    /// Returns the sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[..8]);
        u64::from_le_bytes(raw)
    }

    /// Returns the raw kind byte.
    #[must_use]
    pub fn kind_byte(&self) -> u8 {
        self.buf[8]
    }

    /// Returns the raw command byte.
    #[must_use]
    pub fn command_byte(&self) -> u8 {
        self.buf[9]
    }

    /// Returns the kind, or `None` for an unknown byte.
    #[must_use]
    pub fn kind(&self) -> Option<BinlogKind> {
        BinlogKind::from_byte(self.kind_byte())
    }

    /// Returns the command, or `None` for an unknown byte.
    #[must_use]
    pub fn command(&self) -> Option<BinlogCommand> {
        BinlogCommand::from_byte(self.command_byte())
    }

    /// Returns the key bytes after the header.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.buf[HEADER_LEN..]
    }

    /// Returns the encoded entry.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the entry and returns its encoding.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Renders `"<seq> <kind> <command> <key>"` for logs and tools.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.seq())?;
        match self.kind() {
            Some(kind) => write!(f, "{} ", kind.name())?,
            None => write!(f, "kind({}) ", self.kind_byte())?,
        }
        match self.command() {
            Some(command) => write!(f, "{} ", command.name())?,
            None => write!(f, "cmd({}) ", self.command_byte())?,
        }
        f.write_str(&hexmem(self.key()))
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogEntry({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_command_bytes() {
        for b in 0..=4u8 {
            assert_eq!(BinlogKind::from_byte(b).map(BinlogKind::as_byte), Some(b));
        }
        assert_eq!(BinlogKind::from_byte(5), None);

        for b in (0..=8u8).chain(10..=14) {
            assert_eq!(
                BinlogCommand::from_byte(b).map(BinlogCommand::as_byte),
                Some(b)
            );
        }
        assert_eq!(BinlogCommand::from_byte(9), None);
        assert_eq!(BinlogCommand::from_byte(15), None);
    }

    #[test]
    fn layout_is_seq_kind_command_key() {
        let entry = LogEntry::new(0x0102, BinlogKind::Mirror, BinlogCommand::KDel, b"abc");
        assert_eq!(
            entry.as_bytes(),
            &[0x02, 0x01, 0, 0, 0, 0, 0, 0, 2, 2, b'a', b'b', b'c']
        );
        assert_eq!(entry.key(), b"abc");
        assert_eq!(entry.kind(), Some(BinlogKind::Mirror));
    }

    #[test]
    fn decode_requires_header() {
        assert_eq!(
            LogEntry::decode(&[0; 9]).unwrap_err(),
            CodecError::truncated(HEADER_LEN, 9)
        );

        let bare = LogEntry::decode(&[0; HEADER_LEN]).unwrap();
        assert_eq!(bare.seq(), 0);
        assert!(bare.key().is_empty());
    }

    #[test]
    fn display_names_kind_and_command() {
        let entry = LogEntry::new(42, BinlogKind::Ctrl, BinlogCommand::QPopFront, b"q\n");
        assert_eq!(entry.to_display_string(), "42 control qpop_front q\\n");

        let odd = LogEntry::from_raw(1, 9, 99, b"");
        assert_eq!(odd.to_string(), "1 kind(9) cmd(99) ");
        assert_eq!(odd.kind(), None);
        assert_eq!(odd.command(), None);
    }
}

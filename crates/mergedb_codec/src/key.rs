//! Storage key namespaces.

use std::fmt;

/// One-byte tag that opens every storage key and names its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Replication log entries.
    SyncLog = 1,
    /// Plain key-value pairs.
    Kv = b'k',
    /// Hash values.
    Hash = b'h',
    /// Hash sizes.
    HashSize = b'H',
    /// Sorted-set members.
    ZSet = b's',
    /// Sorted-set scores.
    ZScore = b'z',
    /// Sorted-set sizes.
    ZSize = b'Z',
    /// Queue items.
    Queue = b'q',
    /// Queue sizes.
    QueueSize = b'Q',
}

impl DataType {
    /// Parses a tag byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::SyncLog),
            b'k' => Some(Self::Kv),
            b'h' => Some(Self::Hash),
            b'H' => Some(Self::HashSize),
            b's' => Some(Self::ZSet),
            b'z' => Some(Self::ZScore),
            b'Z' => Some(Self::ZSize),
            b'q' => Some(Self::Queue),
            b'Q' => Some(Self::QueueSize),
            _ => None,
        }
    }

    /// Returns the tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the namespace of a storage key, if it has a known tag.
    #[must_use]
    pub fn of_key(key: &[u8]) -> Option<Self> {
        key.first().copied().and_then(Self::from_byte)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SyncLog => "synclog",
            Self::Kv => "kv",
            Self::Hash => "hash",
            Self::HashSize => "hsize",
            Self::ZSet => "zset",
            Self::ZScore => "zscore",
            Self::ZSize => "zsize",
            Self::Queue => "queue",
            Self::QueueSize => "qsize",
        };
        f.write_str(name)
    }
}

/// Length of a replication log storage key.
pub const SEQ_KEY_LEN: usize = 9;

/// Encodes the storage key of log entry `seq`.
///
/// The sequence is big-endian so byte order matches numeric order.
///
/// ```
/// use mergedb_codec::{decode_seq_key, encode_seq_key};
///
/// let key = encode_seq_key(258);
/// assert_eq!(key, [1, 0, 0, 0, 0, 0, 0, 1, 2]);
/// assert_eq!(decode_seq_key(&key), Some(258));
/// ```
#[must_use]
pub fn encode_seq_key(seq: u64) -> [u8; SEQ_KEY_LEN] {
    let mut key = [0u8; SEQ_KEY_LEN];
    key[0] = DataType::SyncLog.as_byte();
    key[1..].copy_from_slice(&seq.to_be_bytes());
    key
}

/// Decodes a log storage key; `None` for any other key.
#[must_use]
pub fn decode_seq_key(key: &[u8]) -> Option<u64> {
    if key.len() != SEQ_KEY_LEN || key[0] != DataType::SyncLog.as_byte() {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&key[1..]);
    Some(u64::from_be_bytes(raw))
}

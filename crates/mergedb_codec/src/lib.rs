//! # MergeDB Codec
//!
//! Binary layouts shared by the MergeDB crates.
//!
//! - [`LogEntry`]: one replication log entry,
//!   `[seq(8)][kind(1)][command(1)][key]`
//! - [`encode_seq_key`] / [`decode_seq_key`]: storage keys of log entries,
//!   big-endian so that byte order is sequence order
//! - [`HashEncoder`]: hash keys and field records in the generic or packed
//!   [`HashScheme`]
//! - [`Decoder`] and [`hexmem`]: read primitives and log-friendly rendering
//!
//! Encoding failures are ordinary results. A [`CodecError`] always means the
//! input was rejected, never that the codec is in a bad state.
//!
//! ## Usage
//!
//! ```
//! use mergedb_codec::{BinlogCommand, BinlogKind, HashEncoder, HashScheme, LogEntry};
//!
//! let encoder = HashEncoder::new(HashScheme::Generic);
//! let key = encoder.encode_key(b"user:1").unwrap();
//! let record = encoder.encode_value(b"name", b"alice").unwrap();
//! assert_eq!(encoder.decode_value(&record).unwrap().value, b"alice");
//!
//! let entry = LogEntry::new(1, BinlogKind::Sync, BinlogCommand::HSet, &key);
//! assert_eq!(entry.key(), key.as_slice());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binlog;
mod bytes;
mod error;
mod hash;
mod key;

pub use binlog::{BinlogCommand, BinlogKind, LogEntry, HEADER_LEN};
pub use bytes::{hexmem, write_len_prefixed, Decoder};
pub use error::{CodecError, CodecResult};
pub use hash::{HashEncoder, HashRecord, HashScheme};
pub use key::{decode_seq_key, encode_seq_key, DataType, SEQ_KEY_LEN};

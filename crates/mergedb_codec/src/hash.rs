//! Hash key and record layouts.
//!
//! Two schemes exist and a dataset uses exactly one of them, chosen when it
//! is created:
//!
//! | Scheme | Record | Separator |
//! |---|---|---|
//! | Generic | `[flen(1)][field][':'][vlen(1)][value]` | `';'` between records |
//! | Packed | `[field(2)][value(2, little-endian i16)]` | none, fixed 4-byte stride |
//!
//! Both share the key layout `['h'][klen(1)][key]`.
//!
//! The packed scheme stores fields of the form `[a-i][0-9][a-i][0-9]`, one
//! byte per column/row pair: `((column - 'a') << 4) | (row - '0')`. Values
//! are decimal strings in `[-30000, 30000]`; `32767` marks a deleted field.

use crate::bytes::{write_len_prefixed, Decoder};
use crate::error::{CodecError, CodecResult};
use crate::key::DataType;
use std::fmt;
use std::str::FromStr;

const GENERIC_DELIM: u8 = b':';
const GENERIC_SEPARATOR: u8 = b';';
const GENERIC_DELETED: &[u8] = b"_deleted_";

const PACKED_STRIDE: usize = 4;
const PACKED_DELETED: &[u8] = b"32767";
const PACKED_DELETED_VALUE: i16 = i16::MAX;
const PACKED_MIN: i16 = -30000;
const PACKED_MAX: i16 = 30000;

/// The byte layout used for hash records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashScheme {
    /// Length-prefixed records of arbitrary bytes.
    #[default]
    Generic,
    /// Fixed-stride records for board-coordinate fields and small integers.
    Packed,
}

impl HashScheme {
    /// Returns the persisted scheme byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Generic => 0,
            Self::Packed => 1,
        }
    }

    /// Parses a persisted scheme byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Generic),
            1 => Some(Self::Packed),
            _ => None,
        }
    }

    /// Returns the lowercase scheme name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Packed => "packed",
        }
    }
}

impl fmt::Display for HashScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashScheme {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(Self::Generic),
            "packed" => Ok(Self::Packed),
            other => Err(CodecError::malformed(format!("unknown hash scheme {other:?}"))),
        }
    }
}

/// One field of a hash and its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashRecord {
    /// Field name.
    pub field: Vec<u8>,
    /// Field value, possibly the scheme's deletion sentinel.
    pub value: Vec<u8>,
}

impl HashRecord {
    /// Creates a record.
    pub fn new(field: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Encodes hash keys and records in one [`HashScheme`].
///
/// Built once when a database is opened and shared by the merge operator
/// and the hash handler.
///
/// # Example
///
/// ```
/// use mergedb_codec::{HashEncoder, HashScheme};
///
/// let encoder = HashEncoder::new(HashScheme::Packed);
/// let record = encoder.encode_value(b"a3b4", b"112").unwrap();
/// assert_eq!(record.len(), 4);
///
/// let decoded = encoder.decode_value(&record).unwrap();
/// assert_eq!(decoded.field, b"a3b4");
/// assert_eq!(decoded.value, b"112");
///
/// assert!(encoder.encode_value(b"j0b4", b"1").is_err());
/// assert!(encoder.encode_value(b"a3b4", b"31000").is_err());
/// assert!(encoder.encode_value(b"a3b4", b"32767").is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEncoder {
    scheme: HashScheme,
}

impl HashEncoder {
    /// Creates an encoder for a scheme.
    #[must_use]
    pub const fn new(scheme: HashScheme) -> Self {
        Self { scheme }
    }

    /// Returns the scheme.
    #[must_use]
    pub const fn scheme(&self) -> HashScheme {
        self.scheme
    }

    /// Encodes the storage key of hash `key`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::TooLong` if `key` exceeds 255 bytes.
    pub fn encode_key(&self, key: &[u8]) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(2 + key.len());
        buf.push(DataType::Hash.as_byte());
        write_len_prefixed(&mut buf, "key", key)?;
        Ok(buf)
    }

    /// Decodes a storage key back into the hash key.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is not the hash tag or the length is off.
    pub fn decode_key(&self, bytes: &[u8]) -> CodecResult<Vec<u8>> {
        let mut decoder = Decoder::new(bytes);
        decoder.expect_u8(DataType::Hash.as_byte())?;
        let key = decoder.read_len_prefixed()?;
        if !decoder.is_empty() {
            return Err(CodecError::malformed("trailing bytes after hash key"));
        }
        Ok(key.to_vec())
    }

    /// Encodes one record.
    ///
    /// # Errors
    ///
    /// Returns an error when the scheme cannot represent the input: field or
    /// value longer than 255 bytes (generic), or a field outside the board
    /// grammar or a value outside the allowed range (packed).
    pub fn encode_value(&self, field: &[u8], value: &[u8]) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.append_record(&mut buf, field, value)?;
        Ok(buf)
    }

    /// Encodes a deletion marker for `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is invalid for the scheme.
    pub fn encode_delete(&self, field: &[u8]) -> CodecResult<Vec<u8>> {
        self.encode_value(field, self.delete_sentinel())
    }

    /// Decodes exactly one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not exactly one well-formed record.
    pub fn decode_value(&self, bytes: &[u8]) -> CodecResult<HashRecord> {
        let mut records = self.decode_values(bytes)?;
        match (records.pop(), records.is_empty()) {
            (Some(record), true) => Ok(record),
            _ => Err(CodecError::malformed(
                "expected exactly one hash record",
            )),
        }
    }

    /// Decodes every record of a stored value or merge operand.
    ///
    /// An empty slice is an empty hash.
    ///
    /// # Errors
    ///
    /// Returns an error on any malformed record.
    pub fn decode_values(&self, bytes: &[u8]) -> CodecResult<Vec<HashRecord>> {
        let mut records = Vec::new();
        self.for_each_record(bytes, |field, value| {
            records.push(HashRecord::new(field, value));
            true
        })?;
        Ok(records)
    }

    /// Serializes records with the scheme's separator or stride.
    ///
    /// # Errors
    ///
    /// Returns an error if any record cannot be encoded.
    pub fn encode_records(&self, records: &[HashRecord]) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        for (i, record) in records.iter().enumerate() {
            if i > 0 && self.scheme == HashScheme::Generic {
                buf.push(GENERIC_SEPARATOR);
            }
            self.append_record(&mut buf, &record.field, &record.value)?;
        }
        Ok(buf)
    }

    /// Counts the records of a stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is malformed.
    pub fn value_count(&self, bytes: &[u8]) -> CodecResult<usize> {
        match self.scheme {
            HashScheme::Packed => {
                check_stride(bytes)?;
                Ok(bytes.len() / PACKED_STRIDE)
            }
            HashScheme::Generic => {
                let mut count = 0;
                self.for_each_record(bytes, |_, _| {
                    count += 1;
                    true
                })?;
                Ok(count)
            }
        }
    }

    /// Returns the value of `field` inside a stored value.
    ///
    /// The packed scheme jumps record by record without decoding values it
    /// does not need.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is malformed or `field` cannot exist
    /// in this scheme.
    pub fn find_value(&self, bytes: &[u8], field: &[u8]) -> CodecResult<Option<Vec<u8>>> {
        match self.scheme {
            HashScheme::Packed => {
                check_stride(bytes)?;
                let packed = pack_field(field)?;
                for chunk in bytes.chunks_exact(PACKED_STRIDE) {
                    if chunk[..2] == packed {
                        return decode_packed_value(&chunk[2..]).map(Some);
                    }
                }
                Ok(None)
            }
            HashScheme::Generic => {
                let mut found = None;
                self.for_each_record(bytes, |f, v| {
                    if f == field {
                        found = Some(v.to_vec());
                        return false;
                    }
                    true
                })?;
                Ok(found)
            }
        }
    }

    /// Returns the value that marks a field as deleted.
    #[must_use]
    pub const fn delete_sentinel(&self) -> &'static [u8] {
        match self.scheme {
            HashScheme::Generic => GENERIC_DELETED,
            HashScheme::Packed => PACKED_DELETED,
        }
    }

    /// Returns true if `value` is the deletion sentinel.
    #[must_use]
    pub fn is_deleted(&self, value: &[u8]) -> bool {
        value == self.delete_sentinel()
    }

    fn append_record(&self, buf: &mut Vec<u8>, field: &[u8], value: &[u8]) -> CodecResult<()> {
        match self.scheme {
            HashScheme::Generic => {
                write_len_prefixed(buf, "field", field)?;
                buf.push(GENERIC_DELIM);
                write_len_prefixed(buf, "value", value)?;
            }
            HashScheme::Packed => {
                let packed = pack_field(field)?;
                let number = parse_packed_value(value)?;
                buf.extend_from_slice(&packed);
                buf.extend_from_slice(&number.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Walks records until `visit` returns false.
    fn for_each_record<F>(&self, bytes: &[u8], mut visit: F) -> CodecResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        match self.scheme {
            HashScheme::Packed => {
                check_stride(bytes)?;
                for chunk in bytes.chunks_exact(PACKED_STRIDE) {
                    let field = unpack_field(&chunk[..2])?;
                    let value = decode_packed_value(&chunk[2..])?;
                    if !visit(field.as_slice(), value.as_slice()) {
                        break;
                    }
                }
            }
            HashScheme::Generic => {
                let mut decoder = Decoder::new(bytes);
                while !decoder.is_empty() {
                    if decoder.position() > 0 {
                        decoder.expect_u8(GENERIC_SEPARATOR)?;
                    }
                    let field = decoder.read_len_prefixed()?;
                    decoder.expect_u8(GENERIC_DELIM)?;
                    let value = decoder.read_len_prefixed()?;
                    if !visit(field, value) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_stride(bytes: &[u8]) -> CodecResult<()> {
    if bytes.len() % PACKED_STRIDE != 0 {
        return Err(CodecError::malformed(format!(
            "packed hash value of {} bytes is not a multiple of {PACKED_STRIDE}",
            bytes.len()
        )));
    }
    Ok(())
}

fn pack_field(field: &[u8]) -> CodecResult<[u8; 2]> {
    let &[c0, r0, c1, r1] = field else {
        return Err(CodecError::invalid_field(format!(
            "packed field must be 4 bytes, got {}",
            field.len()
        )));
    };
    Ok([pack_square(c0, r0)?, pack_square(c1, r1)?])
}

fn pack_square(column: u8, row: u8) -> CodecResult<u8> {
    if !(b'a'..=b'i').contains(&column) {
        return Err(CodecError::invalid_field(format!(
            "column {:?} outside a-i",
            column as char
        )));
    }
    if !row.is_ascii_digit() {
        return Err(CodecError::invalid_field(format!(
            "row {:?} outside 0-9",
            row as char
        )));
    }
    Ok(((column - b'a') << 4) | (row - b'0'))
}

fn unpack_field(packed: &[u8]) -> CodecResult<Vec<u8>> {
    let mut field = Vec::with_capacity(4);
    for &square in packed {
        let (column, row) = (square >> 4, square & 0x0f);
        if column > 8 || row > 9 {
            return Err(CodecError::malformed(format!(
                "packed field byte 0x{square:02x} out of range"
            )));
        }
        field.push(b'a' + column);
        field.push(b'0' + row);
    }
    Ok(field)
}

fn parse_packed_value(value: &[u8]) -> CodecResult<i16> {
    let text = std::str::from_utf8(value)
        .map_err(|_| CodecError::invalid_value("packed value is not a decimal number"))?;
    let number: i16 = text
        .parse()
        .map_err(|_| CodecError::invalid_value(format!("{text:?} is not a 16-bit integer")))?;
    if number.to_string() != text {
        return Err(CodecError::invalid_value(format!(
            "{text:?} is not in canonical decimal form"
        )));
    }
    if number != PACKED_DELETED_VALUE && !(PACKED_MIN..=PACKED_MAX).contains(&number) {
        return Err(CodecError::invalid_value(format!(
            "{number} outside [{PACKED_MIN}, {PACKED_MAX}]"
        )));
    }
    Ok(number)
}

fn decode_packed_value(raw: &[u8]) -> CodecResult<Vec<u8>> {
    let number = i16::from_le_bytes([raw[0], raw[1]]);
    if number != PACKED_DELETED_VALUE && !(PACKED_MIN..=PACKED_MAX).contains(&number) {
        return Err(CodecError::malformed(format!(
            "packed value {number} out of range"
        )));
    }
    Ok(number.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GENERIC: HashEncoder = HashEncoder::new(HashScheme::Generic);
    const PACKED: HashEncoder = HashEncoder::new(HashScheme::Packed);

    #[test]
    fn scheme_names_and_bytes() {
        for scheme in [HashScheme::Generic, HashScheme::Packed] {
            assert_eq!(HashScheme::from_byte(scheme.as_byte()), Some(scheme));
            assert_eq!(scheme.name().parse::<HashScheme>().unwrap(), scheme);
        }
        assert_eq!(HashScheme::from_byte(2), None);
        assert!("chess".parse::<HashScheme>().is_err());
        assert_eq!(HashScheme::default(), HashScheme::Generic);
    }

    #[test]
    fn key_layout() {
        let key = GENERIC.encode_key(b"board").unwrap();
        assert_eq!(key, b"h\x05board");
        assert_eq!(PACKED.encode_key(b"board").unwrap(), key);
        assert_eq!(GENERIC.decode_key(&key).unwrap(), b"board");

        assert!(GENERIC.decode_key(b"k\x05board").is_err());
        assert!(GENERIC.decode_key(b"h\x09board").is_err());
        assert!(GENERIC.decode_key(b"h\x01board").is_err());
        assert!(GENERIC.encode_key(&[b'x'; 256]).is_err());
    }

    #[test]
    fn generic_record_layout() {
        let record = GENERIC.encode_value(b"f1", b"100").unwrap();
        assert_eq!(record, b"\x02f1:\x03100");
        assert_eq!(
            GENERIC.decode_value(&record).unwrap(),
            HashRecord::new(*b"f1", *b"100")
        );
        assert!(matches!(
            GENERIC.encode_value(&[b'f'; 256], b"v"),
            Err(CodecError::TooLong { what: "field", .. })
        ));
        assert!(matches!(
            GENERIC.encode_value(b"f", &[b'v'; 256]),
            Err(CodecError::TooLong { what: "value", .. })
        ));
    }

    #[test]
    fn generic_records_join_with_separator() {
        let records = vec![
            HashRecord::new(*b"f1", *b"150"),
            HashRecord::new(*b"f2", *b"200"),
        ];
        let bytes = GENERIC.encode_records(&records).unwrap();
        assert_eq!(bytes, b"\x02f1:\x03150;\x02f2:\x03200");
        assert_eq!(GENERIC.decode_values(&bytes).unwrap(), records);
        assert_eq!(GENERIC.value_count(&bytes).unwrap(), 2);
        assert_eq!(GENERIC.find_value(&bytes, b"f2").unwrap(), Some(b"200".to_vec()));
        assert_eq!(GENERIC.find_value(&bytes, b"f3").unwrap(), None);
    }

    #[test]
    fn generic_fields_may_contain_separators() {
        let records = vec![HashRecord::new(*b"a;b:c", *b";;")];
        let bytes = GENERIC.encode_records(&records).unwrap();
        assert_eq!(GENERIC.decode_values(&bytes).unwrap(), records);
    }

    #[test]
    fn generic_rejects_malformed() {
        assert!(GENERIC.decode_values(b"\x02f1;\x01v").is_err());
        assert!(GENERIC.decode_values(b"\x02f1:\x01v:").is_err());
        assert!(GENERIC.decode_values(b"\x05f1").is_err());
        assert!(GENERIC.decode_value(b"").is_err());
        assert!(GENERIC
            .decode_value(b"\x01a:\x011;\x01b:\x012")
            .is_err());
    }

    #[test]
    fn packed_round_trip_and_rejections() {
        let record = PACKED.encode_value(b"a3b4", b"112").unwrap();
        assert_eq!(record, [0x03, 0x14, 112, 0]);
        assert_eq!(
            PACKED.decode_value(&record).unwrap(),
            HashRecord::new(*b"a3b4", *b"112")
        );

        assert!(matches!(
            PACKED.encode_value(b"j0b4", b"1"),
            Err(CodecError::InvalidField { .. })
        ));
        assert!(matches!(
            PACKED.encode_value(b"a3b4", b"31000"),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(PACKED.encode_value(b"a3b4", b"32767").is_ok());
        assert!(PACKED.encode_value(b"a3b4", b"-30000").is_ok());
        assert!(PACKED.encode_value(b"a3b4", b"-30001").is_err());
        assert!(PACKED.encode_value(b"a3", b"1").is_err());
        assert!(PACKED.encode_value(b"a3bx", b"1").is_err());
        assert!(PACKED.encode_value(b"a3b4", b"+1").is_err());
        assert!(PACKED.encode_value(b"a3b4", b"one").is_err());
        assert!(PACKED.encode_value(b"a3b4", b"70000").is_err());
    }

    #[test]
    fn packed_records_use_fixed_stride() {
        let records = vec![
            HashRecord::new(*b"i9i9", *b"-5"),
            HashRecord::new(*b"a0a0", *b"0"),
        ];
        let bytes = PACKED.encode_records(&records).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(PACKED.decode_values(&bytes).unwrap(), records);
        assert_eq!(PACKED.value_count(&bytes).unwrap(), 2);
        assert_eq!(PACKED.find_value(&bytes, b"a0a0").unwrap(), Some(b"0".to_vec()));
        assert_eq!(PACKED.find_value(&bytes, b"b0a0").unwrap(), None);
        assert!(PACKED.value_count(&bytes[..7]).is_err());
        assert!(PACKED.find_value(&bytes, b"z0a0").is_err());
    }

    #[test]
    fn packed_decode_rejects_corrupt_bytes() {
        assert!(PACKED.decode_values(&[0x90, 0x00, 0, 0]).is_err());
        assert!(PACKED.decode_values(&[0x0a, 0x00, 0, 0]).is_err());
        let too_big = 31000i16.to_le_bytes();
        assert!(PACKED.decode_values(&[0, 0, too_big[0], too_big[1]]).is_err());
    }

    #[test]
    fn sentinels() {
        assert_eq!(GENERIC.delete_sentinel(), b"_deleted_");
        assert_eq!(PACKED.delete_sentinel(), b"32767");
        assert!(GENERIC.is_deleted(b"_deleted_"));
        assert!(!GENERIC.is_deleted(b"32767"));

        let tombstone = PACKED.encode_delete(b"c2d3").unwrap();
        let record = PACKED.decode_value(&tombstone).unwrap();
        assert!(PACKED.is_deleted(&record.value));
    }

    proptest! {
        #[test]
        fn decoding_garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = GENERIC.decode_values(&bytes);
            let _ = PACKED.decode_values(&bytes);
            let _ = GENERIC.value_count(&bytes);
            let _ = GENERIC.decode_key(&bytes);
        }

        #[test]
        fn find_value_agrees_with_decode(
            pairs in proptest::collection::vec(
                (proptest::collection::vec(any::<u8>(), 1..8), proptest::collection::vec(any::<u8>(), 0..8)),
                0..8,
            ),
            wanted in proptest::collection::vec(any::<u8>(), 1..8),
        ) {
            let records: Vec<HashRecord> = pairs
                .into_iter()
                .map(|(f, v)| HashRecord::new(f, v))
                .collect();
            let bytes = GENERIC.encode_records(&records).unwrap();
            let expected = records
                .iter()
                .find(|r| r.field == wanted)
                .map(|r| r.value.clone());
            prop_assert_eq!(GENERIC.find_value(&bytes, &wanted).unwrap(), expected);
            prop_assert_eq!(GENERIC.value_count(&bytes).unwrap(), records.len());
        }
    }
}

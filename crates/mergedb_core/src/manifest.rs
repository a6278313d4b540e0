//! Database manifest.
//!
//! ```text
//! | magic "MMFN" (4) | version (2) | format major (2) | format minor (2) |
//! | hash scheme (1) | operator name len (2) | operator name |
//! ```
//!
//! Integers are little-endian.

use crate::error::{CoreError, CoreResult};
use mergedb_codec::HashScheme;

/// Magic bytes for manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"MMFN";

/// Current manifest version.
pub const MANIFEST_VERSION: u16 = 1;

/// Format version written by this release.
pub const FORMAT_VERSION: (u16, u16) = (1, 0);

/// Database metadata fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Format version (major, minor).
    pub format_version: (u16, u16),
    /// Hash layout of every stored value.
    pub hash_scheme: HashScheme,
    /// Name of the merge operator the journal was written with.
    pub merge_operator: String,
}

impl Manifest {
    /// Creates a manifest for a new database.
    pub fn new(hash_scheme: HashScheme, merge_operator: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            hash_scheme,
            merge_operator: merge_operator.into(),
        }
    }

    /// Encodes the manifest to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = self.merge_operator.as_bytes();
        let mut buf = Vec::with_capacity(13 + name.len());

        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.format_version.0.to_le_bytes());
        buf.extend_from_slice(&self.format_version.1.to_le_bytes());
        buf.push(self.hash_scheme.as_byte());

        let name_len = u16::try_from(name.len()).unwrap_or(u16::MAX);
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(&name[..usize::from(name_len)]);

        buf
    }

    /// Decodes a manifest from bytes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidFormat` for a bad magic, an unsupported
    /// version, an unknown scheme byte or a short buffer.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 4 || data[0..4] != MANIFEST_MAGIC {
            return Err(CoreError::invalid_format("invalid manifest magic"));
        }
        let mut cursor = 4;

        let version = read_u16(data, &mut cursor)?;
        if version > MANIFEST_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported manifest version: {version}"
            )));
        }

        let format_major = read_u16(data, &mut cursor)?;
        let format_minor = read_u16(data, &mut cursor)?;

        let scheme_byte = *data
            .get(cursor)
            .ok_or_else(|| CoreError::invalid_format("manifest too short"))?;
        cursor += 1;
        let hash_scheme = HashScheme::from_byte(scheme_byte).ok_or_else(|| {
            CoreError::invalid_format(format!("unknown hash scheme byte {scheme_byte}"))
        })?;

        let name_len = usize::from(read_u16(data, &mut cursor)?);
        let name = data
            .get(cursor..cursor + name_len)
            .ok_or_else(|| CoreError::invalid_format("manifest too short"))?;
        let merge_operator = String::from_utf8(name.to_vec())
            .map_err(|_| CoreError::invalid_format("merge operator name is not UTF-8"))?;

        Ok(Self {
            format_version: (format_major, format_minor),
            hash_scheme,
            merge_operator,
        })
    }
}

fn read_u16(data: &[u8], cursor: &mut usize) -> CoreResult<u16> {
    let bytes = data
        .get(*cursor..*cursor + 2)
        .ok_or_else(|| CoreError::invalid_format("manifest too short"))?;
    *cursor += 2;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

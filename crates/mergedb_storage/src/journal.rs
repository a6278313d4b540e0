//! Journal framing and replay.
//!
//! Every engine write is appended to the journal before it becomes visible.
//! Each record is framed as:
//!
//! ```text
//! | magic "MJNL"(4) | type(1) | len(4) | payload | crc32(4) |
//! ```
//!
//! The CRC covers everything before it. The first record is always a
//! header naming the column families and the merge operator.

use crate::batch::WriteBatch;
use crate::device::LogDevice;
use crate::error::{StorageError, StorageResult};
use tracing::warn;

/// Magic bytes opening every journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"MJNL";

/// magic (4) + type (1) + length (4)
const HEADER_SIZE: usize = 9;

const CRC_SIZE: usize = 4;

const TYPE_HEADER: u8 = 1;
const TYPE_BATCH: u8 = 2;

/// Layout facts persisted at the start of the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JournalHeader {
    pub families: Vec<String>,
    pub merge_operator: Option<String>,
}

impl JournalHeader {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.families.len() as u8);
        for name in &self.families {
            buf.push(name.len() as u8);
            buf.extend_from_slice(name.as_bytes());
        }
        match &self.merge_operator {
            Some(name) => {
                buf.push(1);
                buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
                buf.extend_from_slice(name.as_bytes());
            }
            None => buf.push(0),
        }
        buf
    }

    fn decode(payload: &[u8]) -> StorageResult<Self> {
        let mut pos = 0usize;

        let count = take(payload, &mut pos, 1)?[0] as usize;
        let mut families = Vec::with_capacity(count);
        for _ in 0..count {
            let len = take(payload, &mut pos, 1)?[0] as usize;
            families.push(utf8(take(payload, &mut pos, len)?)?);
        }

        let merge_operator = match take(payload, &mut pos, 1)?[0] {
            0 => None,
            1 => {
                let raw = take(payload, &mut pos, 2)?;
                let len = u16::from_le_bytes([raw[0], raw[1]]) as usize;
                Some(utf8(take(payload, &mut pos, len)?)?)
            }
            _ => return Err(StorageError::corrupted("malformed journal header")),
        };

        Ok(Self {
            families,
            merge_operator,
        })
    }
}

fn take<'p>(payload: &'p [u8], pos: &mut usize, len: usize) -> StorageResult<&'p [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= payload.len())
        .ok_or_else(|| StorageError::corrupted("journal header truncated"))?;
    let slice = &payload[*pos..end];
    *pos = end;
    Ok(slice)
}

fn utf8(raw: &[u8]) -> StorageResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| StorageError::corrupted("journal header name is not utf-8"))
}

/// What a replay recovered from the device.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub header: Option<JournalHeader>,
    pub batches: Vec<WriteBatch>,
    pub truncated_bytes: u64,
}

/// Append-only record log on top of a [`LogDevice`].
pub(crate) struct Journal {
    device: Box<dyn LogDevice>,
    sync_writes: bool,
}

impl Journal {
    pub fn new(device: Box<dyn LogDevice>, sync_writes: bool) -> Self {
        Self {
            device,
            sync_writes,
        }
    }

    /// Reads every record back.
    ///
    /// A record cut short by the end of the device is a torn write from a
    /// crash; it is truncated away. A bad magic or CRC anywhere else is
    /// corruption.
    pub fn replay(&mut self) -> StorageResult<Replay> {
        let data = self.device.read_all()?;
        let mut replay = Replay::default();
        let mut offset = 0usize;

        while offset < data.len() {
            let remaining = data.len() - offset;
            if remaining < HEADER_SIZE {
                break;
            }

            let header = &data[offset..offset + HEADER_SIZE];
            if header[0..4] != JOURNAL_MAGIC {
                return Err(StorageError::corrupted(format!(
                    "bad journal magic at offset {offset}"
                )));
            }
            let record_type = header[4];
            let len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
            let total = HEADER_SIZE + len + CRC_SIZE;
            if remaining < total {
                break;
            }

            let body_end = offset + HEADER_SIZE + len;
            let stored = u32::from_le_bytes([
                data[body_end],
                data[body_end + 1],
                data[body_end + 2],
                data[body_end + 3],
            ]);
            if crc32fast::hash(&data[offset..body_end]) != stored {
                return Err(StorageError::corrupted(format!(
                    "journal checksum mismatch at offset {offset}"
                )));
            }

            let payload = &data[offset + HEADER_SIZE..body_end];
            match record_type {
                TYPE_HEADER if offset == 0 => {
                    replay.header = Some(JournalHeader::decode(payload)?);
                }
                TYPE_BATCH if replay.header.is_some() => {
                    replay.batches.push(WriteBatch::decode(payload)?);
                }
                other => {
                    return Err(StorageError::corrupted(format!(
                        "unexpected journal record type {other} at offset {offset}"
                    )));
                }
            }
            offset += total;
        }

        if offset < data.len() {
            let torn = (data.len() - offset) as u64;
            warn!(offset, bytes = torn, "truncating torn journal tail");
            self.device.truncate(offset as u64)?;
            replay.truncated_bytes = torn;
        }

        Ok(replay)
    }

    pub fn append_header(&mut self, header: &JournalHeader) -> StorageResult<()> {
        self.append_frame(TYPE_HEADER, &header.encode())
    }

    pub fn append_batch(&mut self, batch: &WriteBatch) -> StorageResult<()> {
        self.append_frame(TYPE_BATCH, &batch.encode())
    }

    /// Atomically swaps the journal for a header plus snapshot batches.
    pub fn rewrite(&mut self, header: &JournalHeader, batches: &[WriteBatch]) -> StorageResult<()> {
        let mut data = frame(TYPE_HEADER, &header.encode())?;
        for batch in batches {
            data.extend_from_slice(&frame(TYPE_BATCH, &batch.encode())?);
        }
        self.device.replace(&data)
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.device.sync()
    }

    pub fn size(&self) -> StorageResult<u64> {
        self.device.size()
    }

    fn append_frame(&mut self, record_type: u8, payload: &[u8]) -> StorageResult<()> {
        let data = frame(record_type, payload)?;
        let before = self.device.size()?;

        let written = self.device.append(&data).and_then(|_| {
            if self.sync_writes {
                self.device.sync()
            } else {
                Ok(())
            }
        });

        if let Err(err) = written {
            // Leave no partial frame behind for the next append to follow.
            if let Err(cleanup) = self.device.truncate(before) {
                warn!(error = %cleanup, "failed to roll back partial journal write");
            }
            return Err(err);
        }
        Ok(())
    }
}

fn frame(record_type: u8, payload: &[u8]) -> StorageResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::invalid_argument("journal record payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&JOURNAL_MAGIC);
    data.push(record_type);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);
    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

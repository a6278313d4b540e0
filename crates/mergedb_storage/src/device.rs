//! Journal device trait definition.

use crate::error::StorageResult;

/// A byte store that holds the engine journal.
///
/// Devices are **opaque append-only logs**. They know nothing about record
/// framing, write batches, or column families; the engine owns all of that.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_all` returns exactly the bytes previously appended
/// - `sync` makes all appended data durable
/// - `replace` swaps the whole contents atomically: a crash leaves either
///   the old bytes or the new bytes, never a mix
///
/// # Implementors
///
/// - [`super::MemoryDevice`] - For tests and ephemeral engines
/// - [`super::FileDevice`] - For persistent storage
/// - [`super::FaultyDevice`] - Wrapper that injects write failures
pub trait LogDevice: Send + Sync {
    /// Reads the full contents of the device.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the device.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs. A failed append may leave a
    /// partial record behind; callers truncate back to the previous size.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Syncs all appended data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the device in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the device to the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than current size
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the whole contents of the device.
    ///
    /// Used when the engine rewrites its journal as a compacted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be written durably. On
    /// error the old contents remain in place.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}

//! In-memory journal device.

use crate::device::LogDevice;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory journal device.
///
/// Clones share the same buffer, so a test can drop an engine and open a
/// new one over the bytes the first one left behind.
///
/// # Example
///
/// ```rust
/// use mergedb_storage::{LogDevice, MemoryDevice};
///
/// let mut device = MemoryDevice::new();
/// let offset = device.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(device.size().unwrap(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryDevice {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryDevice {
    /// Creates a new empty in-memory device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device holding pre-existing bytes.
    ///
    /// Useful for testing recovery from hand-crafted journals.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the device contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl LogDevice for MemoryDevice {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::invalid_argument(format!(
                "cannot truncate to size {new_size} which is greater than current size {current_size}"
            )));
        }

        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, new_data: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.clear();
        data.extend_from_slice(new_data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let device = MemoryDevice::new();
        assert_eq!(device.size().unwrap(), 0);
        assert!(device.data().is_empty());
    }

    #[test]
    fn memory_append_returns_offsets() {
        let mut device = MemoryDevice::new();
        assert_eq!(device.append(b"hello").unwrap(), 0);
        assert_eq!(device.append(b" world").unwrap(), 5);
        assert_eq!(device.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn memory_clones_share_contents() {
        let mut device = MemoryDevice::new();
        let observer = device.clone();
        device.append(b"shared").unwrap();
        assert_eq!(observer.data(), b"shared");
    }

    #[test]
    fn memory_truncate_and_replace() {
        let mut device = MemoryDevice::with_data(b"hello world".to_vec());
        device.truncate(5).unwrap();
        assert_eq!(device.data(), b"hello");
        assert!(device.truncate(50).is_err());

        device.replace(b"fresh").unwrap();
        assert_eq!(device.data(), b"fresh");
    }
}

//! Failure-injecting journal device.

use crate::device::LogDevice;
use crate::error::{StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FaultState {
    fail_appends: AtomicBool,
    tear_next_append: AtomicBool,
    fail_syncs: AtomicBool,
    fail_replace: AtomicBool,
    injected: AtomicU64,
}

/// Handle that arms and disarms the faults of a [`FaultyDevice`].
///
/// The switch stays usable after the device has been moved into an engine.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    state: Arc<FaultState>,
}

impl FaultSwitch {
    /// Makes every following append fail without writing anything.
    pub fn fail_appends(&self, fail: bool) {
        self.state.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Makes the next append write half of its bytes and then fail.
    pub fn tear_next_append(&self) {
        self.state.tear_next_append.store(true, Ordering::SeqCst);
    }

    /// Makes every following sync fail.
    pub fn fail_syncs(&self, fail: bool) {
        self.state.fail_syncs.store(fail, Ordering::SeqCst);
    }

    /// Makes every following contents replacement fail.
    pub fn fail_replace(&self, fail: bool) {
        self.state.fail_replace.store(fail, Ordering::SeqCst);
    }

    /// Disarms every fault.
    pub fn reset(&self) {
        self.fail_appends(false);
        self.fail_syncs(false);
        self.fail_replace(false);
        self.state.tear_next_append.store(false, Ordering::SeqCst);
    }

    /// Returns how many operations have been failed on purpose.
    #[must_use]
    pub fn injected(&self) -> u64 {
        self.state.injected.load(Ordering::SeqCst)
    }

    fn record(&self, what: &str) -> StorageError {
        self.state.injected.fetch_add(1, Ordering::SeqCst);
        StorageError::Io(io::Error::other(format!("injected {what} failure")))
    }
}

/// A device wrapper that fails writes on demand.
///
/// Used to check that a failed commit leaves no trace in the engine.
///
/// # Example
///
/// ```rust
/// use mergedb_storage::{FaultyDevice, LogDevice, MemoryDevice};
///
/// let (mut device, switch) = FaultyDevice::new(Box::new(MemoryDevice::new()));
/// switch.fail_appends(true);
/// assert!(device.append(b"lost").is_err());
/// switch.reset();
/// assert!(device.append(b"kept").is_ok());
/// ```
pub struct FaultyDevice {
    inner: Box<dyn LogDevice>,
    switch: FaultSwitch,
}

impl FaultyDevice {
    /// Wraps a device and returns it with its fault switch.
    #[must_use]
    pub fn new(inner: Box<dyn LogDevice>) -> (Self, FaultSwitch) {
        let switch = FaultSwitch::default();
        (
            Self {
                inner,
                switch: switch.clone(),
            },
            switch,
        )
    }
}

impl LogDevice for FaultyDevice {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        self.inner.read_all()
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = &self.switch.state;
        if state.fail_appends.load(Ordering::SeqCst) {
            return Err(self.switch.record("append"));
        }
        if state.tear_next_append.swap(false, Ordering::SeqCst) {
            self.inner.append(&data[..data.len() / 2])?;
            return Err(self.switch.record("torn append"));
        }
        self.inner.append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.switch.state.fail_syncs.load(Ordering::SeqCst) {
            return Err(self.switch.record("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.switch.state.fail_replace.load(Ordering::SeqCst) {
            return Err(self.switch.record("replace"));
        }
        self.inner.replace(data)
    }
}

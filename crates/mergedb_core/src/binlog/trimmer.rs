//! Background retention for the replication log.

use super::queue::LogState;
use crate::error::{CoreError, CoreResult};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to the trimmer thread.
///
/// The thread wakes every `trim_interval`, runs one retention pass and goes
/// back to sleep. It exits when a stop message arrives or the handle is
/// dropped, and acknowledges on a second channel before returning.
pub(crate) struct Trimmer {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

impl Trimmer {
    /// Spawns the trimmer thread.
    pub(crate) fn start(state: Arc<LogState>) -> CoreResult<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("mergedb-binlog-trim".to_string())
            .spawn(move || run(&state, &stop_rx, &done_tx))
            .map_err(|err| {
                CoreError::startup_failed(format!("cannot spawn binlog trimmer: {err}"))
            })?;

        Ok(Self {
            stop_tx,
            done_rx,
            handle,
        })
    }

    /// Signals the thread and waits up to `timeout` for it to acknowledge.
    ///
    /// Returns true if the thread was joined. Otherwise it is detached and
    /// finishes its current pass on its own.
    pub(crate) fn shutdown(self, timeout: Duration) -> bool {
        // A send error means the thread is already gone.
        let _ = self.stop_tx.send(());
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!("binlog trimmer panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "binlog trimmer did not stop in time, detaching");
                false
            }
        }
    }
}

fn run(state: &LogState, stop_rx: &Receiver<()>, done_tx: &Sender<()>) {
    let interval = state.config().trim_interval;
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if let Err(err) = state.trim_pass() {
                    warn!(error = %err, "binlog trim pass failed, retrying next cycle");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("binlog trimmer quit");
    let _ = done_tx.send(());
}

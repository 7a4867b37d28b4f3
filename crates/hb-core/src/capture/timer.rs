//! Cancellable repeating flush timer for the file capture strategy.

use std::fs::File;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Periodically syncs a log file to disk on a background thread.
///
/// The hosted runtime's writes land in the file via the redirected
/// descriptor at unpredictable times; syncing on a timer bounds the I/O
/// cost for an otherwise low-volume stream. Cancellation is synchronous:
/// [`cancel`](Self::cancel) joins the thread before returning.
pub(crate) struct FlushTimer {
    cancel_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    pub(crate) fn start(file: File, period: Duration) -> io::Result<Self> {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("hb-flush-timer".to_string())
            .spawn(move || {
                loop {
                    match cancel_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = file.sync_data();
                        }
                        // Cancelled, or the timer owner is gone.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self {
            cancel_tx,
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for the thread to exit.
    pub(crate) fn cancel(mut self) {
        let _ = self.cancel_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

//! Process-wide hosting state.
//!
//! One [`ProcessContext`] exists per worker process. It owns the hosting
//! options resolved at startup and the standard-stream capture session, so
//! nothing in the bridge reaches for globals.

use crate::capture::{self, OutputCapture};
use crate::config::HostingOptions;
use crate::host::HostServer;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Everything the bridge knows about this worker process.
///
/// Capture activation is best-effort: a failure to redirect the streams is
/// logged once and hosting proceeds without diagnostics, since refusing to
/// serve over a missing log file would be worse than the missing log file.
pub struct ProcessContext {
    options: Arc<HostingOptions>,
    host: Arc<dyn HostServer>,
    capture: Mutex<Option<Box<dyn OutputCapture>>>,
}

impl ProcessContext {
    pub fn new(options: HostingOptions, host: Arc<dyn HostServer>) -> Self {
        Self {
            options: Arc::new(options),
            host,
            capture: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &Arc<HostingOptions> {
        &self.options
    }

    /// Select and start the stream-capture strategy for this process.
    /// Idempotent; only the first call activates anything.
    pub fn activate_capture(&self) {
        let mut slot = self.capture.lock().unwrap();
        if slot.is_some() {
            return;
        }

        let capture =
            capture::create_capture(&self.options, self.host.is_command_line_launch());
        match capture.start() {
            Ok(()) => {
                *slot = Some(capture);
            }
            Err(err) => {
                warn!("Standard-stream capture unavailable: {err}");
            }
        }
    }

    /// The hosted runtime finished starting; let the capture strategy
    /// collapse itself if it only existed for startup diagnostics.
    pub fn notify_startup_complete(&self) {
        if let Some(capture) = self.capture.lock().unwrap().as_ref() {
            capture.notify_startup_complete();
        }
    }

    /// Tear the capture session down, restoring the original streams.
    pub fn stop_capture(&self) {
        if let Some(capture) = self.capture.lock().unwrap().as_ref() {
            if let Err(err) = capture.stop() {
                warn!("Could not stop stream capture cleanly: {err}");
            }
        }
    }

    /// The tail of whatever the runtime wrote to the captured streams.
    /// Surfaced in diagnostics after an abnormal start or shutdown.
    pub fn captured_output(&self) -> Option<Vec<u8>> {
        let captured = self
            .capture
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|capture| capture.read_captured_text());
        if let Some(bytes) = &captured {
            info!(len = bytes.len(), "Captured runtime output available");
        }
        captured
    }
}

//! Process-wide standard-stream capture.
//!
//! Before the hosted runtime produces any output, the process's stdout and
//! stderr are redirected to a durable sink so that native crashes and early
//! startup failures are diagnosable even though no structured logging
//! channel exists yet. Three interchangeable strategies sit behind the
//! [`OutputCapture`] trait:
//!
//! - [`NullCapture`] — no redirection; used when the host runs attached to a
//!   console and output is already visible.
//! - [`FileCapture`] — a timestamped, pid-suffixed log file with a periodic
//!   flush; the file is deleted again if nothing was ever written.
//! - [`PipeCapture`] — an anonymous pipe drained by a background thread into
//!   a capped in-memory buffer.
//!
//! A session moves `Uninitialized → Active → Stopped`; `Active → Stopped` is
//! the only transition and is terminal. `stop()` is idempotent and safe to
//! race: a disposed flag is checked both before and after taking the
//! session lock.

mod file;
mod null;
mod pipe;
mod redirect;
mod timer;

pub use file::{FILE_TAIL_CAP, FileCapture};
pub use null::NullCapture;
pub use pipe::{PIPE_CAPTURE_CAP, PipeCapture};

use crate::config::HostingOptions;
use serde::Deserialize;
use std::io;
use thiserror::Error;

/// Capture strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Null,
    File,
    Pipe,
}

/// Errors from starting a capture session. These are terminal for capture
/// only: hosting proceeds without diagnostics and the failure is logged
/// once by the caller.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The backing log file or pipe could not be created.
    #[error("failed to create capture backing store ({what}): {source}")]
    BackingStoreCreateFailed { what: String, source: io::Error },

    /// The standard streams could not be redirected to the backing store.
    #[error("failed to redirect standard streams: {0}")]
    RedirectionFailed(#[from] io::Error),
}

/// Capability contract for a capture session.
///
/// Implementations own the redirection of the process's two standard output
/// streams for the lifetime of the hosted runtime. All methods are safe to
/// call from multiple threads; `stop` in particular runs its teardown at
/// most once no matter how many callers race it.
pub trait OutputCapture: Send + Sync {
    /// Redirect the standard streams into the backing store. Valid only
    /// once, before any runtime code runs.
    fn start(&self) -> Result<(), CaptureError>;

    /// Restore the original streams and tear the session down. Idempotent;
    /// second and later calls are no-ops returning success.
    fn stop(&self) -> Result<(), CaptureError>;

    /// The last captured bytes, up to a strategy-specific cap. `None` when
    /// nothing was captured. This is how the host surfaces native failure
    /// diagnostics after an abnormal shutdown.
    fn read_captured_text(&self) -> Option<Vec<u8>>;

    /// The hosted runtime finished starting and has its own logging. The
    /// pipe strategy collapses its session here; others keep running.
    fn notify_startup_complete(&self) {}
}

/// Select and build the capture strategy for this process.
///
/// An explicit `capture_mode` in the options wins; otherwise a command-line
/// launch gets [`NullCapture`] (output already goes to the console), an app
/// with capture enabled gets [`FileCapture`], and everything else gets
/// [`PipeCapture`] so startup failures are still diagnosable.
pub fn create_capture(
    options: &HostingOptions,
    command_line_launch: bool,
) -> Box<dyn OutputCapture> {
    let mode = options.capture_mode.unwrap_or(if command_line_launch {
        CaptureMode::Null
    } else if options.capture_enabled {
        CaptureMode::File
    } else {
        CaptureMode::Pipe
    });

    match mode {
        CaptureMode::Null => Box::new(NullCapture),
        CaptureMode::File => Box::new(FileCapture::new(
            &options.stdout_log_file,
            &options.application_root,
        )),
        CaptureMode::Pipe => Box::new(PipeCapture::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(enabled: bool, mode: Option<CaptureMode>) -> HostingOptions {
        HostingOptions {
            capture_enabled: enabled,
            capture_mode: mode,
            application_root: PathBuf::from("."),
            ..HostingOptions::default()
        }
    }

    #[test]
    fn console_launch_selects_null() {
        let capture = create_capture(&options(true, None), true);
        assert!(capture.read_captured_text().is_none());
        assert!(capture.stop().is_ok());
    }

    #[test]
    fn explicit_mode_wins_over_flags() {
        // Enabled would normally mean File, but the override forces Null.
        let capture = create_capture(&options(true, Some(CaptureMode::Null)), false);
        assert!(capture.start().is_ok());
        assert!(capture.read_captured_text().is_none());
    }
}

//! No-op capture for console launches.

use super::{CaptureError, OutputCapture};

/// Capture strategy that captures nothing.
///
/// Used when the worker runs attached to a console: output is already
/// visible and redirecting it would hide it from the operator.
pub struct NullCapture;

impl OutputCapture for NullCapture {
    fn start(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn read_captured_text(&self) -> Option<Vec<u8>> {
        None
    }
}

//! Pipe-backed capture: standard streams drained into a capped in-memory
//! buffer by a background thread.

use super::redirect::StdStreamGuard;
use super::{CaptureError, OutputCapture};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Upper bound on retained capture bytes. Past this the pipe keeps being
/// drained so the writer never blocks, but nothing more is kept.
pub const PIPE_CAPTURE_CAP: usize = 30 * 1024;

struct ActivePipe {
    guard: StdStreamGuard,
    #[cfg(unix)]
    write_fd: libc::c_int,
    reader: JoinHandle<()>,
}

/// Capture strategy backed by an anonymous pipe.
///
/// Used when no log file is configured: without it, output written before
/// the runtime's own logging comes up (or during a native crash) would be
/// lost entirely. The reader thread exits when the pipe's write side is
/// closed during `stop()`.
pub struct PipeCapture {
    disposed: AtomicBool,
    state: Mutex<Option<ActivePipe>>,
    captured: Arc<Mutex<Vec<u8>>>,
}

impl PipeCapture {
    pub fn new() -> Self {
        Self {
            disposed: AtomicBool::new(false),
            state: Mutex::new(None),
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for PipeCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputCapture for PipeCapture {
    #[cfg(unix)]
    fn start(&self) -> Result<(), CaptureError> {
        use std::os::unix::io::FromRawFd;

        let mut state = self.state.lock().unwrap();
        debug_assert!(state.is_none(), "pipe capture started twice");

        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(CaptureError::BackingStoreCreateFailed {
                what: "anonymous pipe".to_string(),
                source: io::Error::last_os_error(),
            });
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let guard = match StdStreamGuard::redirect_to(write_fd) {
            Ok(guard) => guard,
            Err(err) => {
                unsafe {
                    libc::close(read_fd);
                    libc::close(write_fd);
                }
                return Err(CaptureError::RedirectionFailed(err));
            }
        };

        let captured = Arc::clone(&self.captured);
        // The File takes ownership of the read end and closes it when the
        // thread exits.
        let mut read_end = unsafe { std::fs::File::from_raw_fd(read_fd) };
        let reader = std::thread::Builder::new()
            .name("hb-pipe-reader".to_string())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match read_end.read(&mut buf) {
                        // EOF: every write-side descriptor is closed.
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut bytes = captured.lock().unwrap();
                            let room = PIPE_CAPTURE_CAP.saturating_sub(bytes.len());
                            bytes.extend_from_slice(&buf[..n.min(room)]);
                            // Past the cap the loop keeps draining so the
                            // writer never blocks on a full pipe.
                        }
                    }
                }
            })
            .map_err(|source| CaptureError::BackingStoreCreateFailed {
                what: "pipe reader thread".to_string(),
                source,
            })?;

        debug!("Capturing standard streams through a pipe");
        *state = Some(ActivePipe {
            guard,
            write_fd,
            reader,
        });
        Ok(())
    }

    #[cfg(not(unix))]
    fn start(&self) -> Result<(), CaptureError> {
        Err(CaptureError::RedirectionFailed(io::Error::new(
            io::ErrorKind::Unsupported,
            "pipe capture is not supported on this platform",
        )))
    }

    fn stop(&self) -> Result<(), CaptureError> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(active) = state.take() {
            let _ = io::stdout().flush();
            let _ = io::stderr().flush();

            // Restore first: fds 1/2 stop referencing the pipe, so closing
            // our write end below is the last writer and the reader sees
            // EOF.
            let mut guard = active.guard;
            guard.restore();

            #[cfg(unix)]
            unsafe {
                libc::close(active.write_fd);
            }

            if active.reader.join().is_err() {
                warn!("Pipe reader thread panicked during shutdown");
            }

            // Forward whatever was captured to the restored stdout so it is
            // not silently swallowed.
            let bytes = self.captured.lock().unwrap();
            if !bytes.is_empty() {
                let _ = io::stdout().write_all(&bytes);
                let _ = io::stdout().flush();
            }
        }
        Ok(())
    }

    fn read_captured_text(&self) -> Option<Vec<u8>> {
        let bytes = self.captured.lock().unwrap();
        if bytes.is_empty() {
            None
        } else {
            Some(bytes.clone())
        }
    }

    /// Once the runtime's own logging is up the pipe has served its
    /// purpose; collapse the session and hand the streams back.
    fn notify_startup_complete(&self) {
        let _ = self.stop();
    }
}

impl Drop for PipeCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

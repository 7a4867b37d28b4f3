//! Low-level standard-stream redirection.
//!
//! The two standard descriptors (1 and 2) are duplicated before being
//! overwritten so that restoration puts back exactly the descriptors the
//! process started with, not merely some valid stream. Restoration is
//! best-effort: a failure is logged and teardown continues.

use std::io::{self, Write};
use tracing::warn;

#[cfg(unix)]
use std::os::unix::io::RawFd;

#[cfg(not(unix))]
pub(crate) type RawFd = i32;

/// Saved copies of the original stdout/stderr descriptors, restored on
/// request. Dropping the guard without calling [`restore`](Self::restore)
/// is a bug in the owning capture session; the descriptors would leak and
/// the streams stay redirected.
#[derive(Debug)]
pub(crate) struct StdStreamGuard {
    saved_stdout: RawFd,
    saved_stderr: RawFd,
    restored: bool,
}

impl StdStreamGuard {
    /// Duplicate the current stdout/stderr, then point both at `target`.
    #[cfg(unix)]
    pub(crate) fn redirect_to(target: RawFd) -> io::Result<Self> {
        // Anything buffered in the Rust-side wrappers belongs to the
        // original streams.
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        let saved_stdout = check(unsafe { libc::dup(libc::STDOUT_FILENO) })?;
        let saved_stderr = match check(unsafe { libc::dup(libc::STDERR_FILENO) }) {
            Ok(fd) => fd,
            Err(err) => {
                unsafe { libc::close(saved_stdout) };
                return Err(err);
            }
        };

        let guard = Self {
            saved_stdout,
            saved_stderr,
            restored: false,
        };
        check(unsafe { libc::dup2(target, libc::STDOUT_FILENO) })?;
        check(unsafe { libc::dup2(target, libc::STDERR_FILENO) })?;
        Ok(guard)
    }

    #[cfg(not(unix))]
    pub(crate) fn redirect_to(_target: RawFd) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream redirection is not supported on this platform",
        ))
    }

    /// Put the saved descriptors back. Safe to call once; later calls are
    /// no-ops.
    pub(crate) fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        #[cfg(unix)]
        unsafe {
            if libc::dup2(self.saved_stdout, libc::STDOUT_FILENO) < 0
                || libc::dup2(self.saved_stderr, libc::STDERR_FILENO) < 0
            {
                warn!(
                    "Failed to restore original standard streams: {}",
                    io::Error::last_os_error()
                );
            }
            libc::close(self.saved_stdout);
            libc::close(self.saved_stderr);
        }
    }
}

impl Drop for StdStreamGuard {
    fn drop(&mut self) {
        if !self.restored {
            warn!("Standard-stream guard dropped without restore; restoring now");
            self.restore();
        }
    }
}

#[cfg(unix)]
fn check(result: libc::c_int) -> io::Result<RawFd> {
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result)
    }
}

//! File-backed capture: a timestamped log file per process start.

use super::redirect::StdStreamGuard;
use super::timer::FlushTimer;
use super::{CaptureError, OutputCapture};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// How much of the log file tail `read_captured_text` returns.
pub const FILE_TAIL_CAP: u64 = 4096;

/// How often the backing file is synced to disk while active.
const FLUSH_PERIOD: Duration = Duration::from_secs(3);

struct ActiveFile {
    file: File,
    guard: StdStreamGuard,
    timer: FlushTimer,
}

struct FileState {
    active: Option<ActiveFile>,
    /// Path of the backing file; cleared again if the file was empty and
    /// got deleted at stop.
    log_path: Option<PathBuf>,
}

/// Capture strategy writing the redirected streams to a log file named
/// `<prefix>_<YYYYMMDDHHMMSS>_<pid>.log` under the application root.
///
/// The file is synced on a timer rather than per write, and deleted again
/// at stop if nothing was ever written to it.
pub struct FileCapture {
    prefix: String,
    application_root: PathBuf,
    disposed: AtomicBool,
    state: Mutex<FileState>,
}

impl FileCapture {
    pub fn new(prefix: &str, application_root: &Path) -> Self {
        Self {
            prefix: prefix.to_string(),
            application_root: application_root.to_path_buf(),
            disposed: AtomicBool::new(false),
            state: Mutex::new(FileState {
                active: None,
                log_path: None,
            }),
        }
    }

    fn build_log_path(&self) -> PathBuf {
        let base = if Path::new(&self.prefix).is_absolute() {
            PathBuf::from(&self.prefix)
        } else {
            self.application_root.join(&self.prefix)
        };
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        PathBuf::from(format!(
            "{}_{}_{}.log",
            base.display(),
            timestamp,
            std::process::id()
        ))
    }
}

impl OutputCapture for FileCapture {
    fn start(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.active.is_none(), "file capture started twice");

        let log_path = self.build_log_path();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|source| {
                CaptureError::BackingStoreCreateFailed {
                    what: parent.display().to_string(),
                    source,
                }
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&log_path)
            .map_err(|source| CaptureError::BackingStoreCreateFailed {
                what: log_path.display().to_string(),
                source,
            })?;

        // The timer's file handle is taken before touching the streams, so
        // every failure from here on can still clean up: nothing was written
        // yet and an empty log file must not be left behind.
        let timer_file = match file.try_clone() {
            Ok(clone) => clone,
            Err(source) => {
                let _ = fs::remove_file(&log_path);
                return Err(CaptureError::BackingStoreCreateFailed {
                    what: "flush timer file handle".to_string(),
                    source,
                });
            }
        };

        #[cfg(unix)]
        let redirected = StdStreamGuard::redirect_to(file.as_raw_fd());
        #[cfg(not(unix))]
        let redirected = StdStreamGuard::redirect_to(0);
        let guard = match redirected {
            Ok(guard) => guard,
            Err(source) => {
                let _ = fs::remove_file(&log_path);
                return Err(CaptureError::RedirectionFailed(source));
            }
        };

        let timer = match FlushTimer::start(timer_file, FLUSH_PERIOD) {
            Ok(timer) => timer,
            Err(source) => {
                let mut guard = guard;
                guard.restore();
                let _ = fs::remove_file(&log_path);
                return Err(CaptureError::BackingStoreCreateFailed {
                    what: "flush timer thread".to_string(),
                    source,
                });
            }
        };

        debug!("Capturing standard streams to {}", log_path.display());
        state.log_path = Some(log_path);
        state.active = Some(ActiveFile { file, guard, timer });
        Ok(())
    }

    fn stop(&self) -> Result<(), CaptureError> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(active) = state.active.take() {
            // Stop the flush timer first so it cannot race the teardown.
            active.timer.cancel();
            let _ = active.file.sync_data();

            let mut guard = active.guard;
            guard.restore();

            if let Some(path) = state.log_path.clone() {
                match fs::metadata(&path) {
                    Ok(meta) if meta.len() == 0 => {
                        if let Err(err) = fs::remove_file(&path) {
                            warn!("Could not delete empty log file {}: {err}", path.display());
                        }
                        state.log_path = None;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("Could not stat log file {}: {err}", path.display());
                    }
                }
            }
        }
        Ok(())
    }

    fn read_captured_text(&self) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let path = state.log_path.as_ref()?;

        let mut file = File::open(path).ok()?;
        let len = file.metadata().ok()?.len();
        if len == 0 {
            return None;
        }

        if len > FILE_TAIL_CAP {
            file.seek(SeekFrom::End(-(FILE_TAIL_CAP as i64))).ok()?;
        }
        let mut tail = Vec::with_capacity(FILE_TAIL_CAP as usize);
        file.read_to_end(&mut tail).ok()?;
        Some(tail)
    }
}

impl Drop for FileCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_carries_prefix_timestamp_and_pid() {
        let capture = FileCapture::new("logs/stdout", Path::new("/srv/app"));
        let path = capture.build_log_path();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(path.starts_with("/srv/app/logs"));
        assert!(name.starts_with("stdout_"));
        assert!(name.ends_with(&format!("_{}.log", std::process::id())));
        // prefix + 14-digit timestamp + pid
        let timestamp = name
            .strip_prefix("stdout_")
            .unwrap()
            .split('_')
            .next()
            .unwrap();
        assert_eq!(timestamp.len(), 14);
        assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn absolute_prefix_ignores_application_root() {
        let capture = FileCapture::new("/var/log/hb/stdout", Path::new("/srv/app"));
        let path = capture.build_log_path();
        assert!(path.starts_with("/var/log/hb"));
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let capture = FileCapture::new("logs/stdout", Path::new("."));
        assert!(capture.stop().is_ok());
        assert!(capture.stop().is_ok());
        assert!(capture.read_captured_text().is_none());
    }
}

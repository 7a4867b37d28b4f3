//! Locating the shared runtime launcher on the machine.
//!
//! When the configured process path is the bare launcher command rather than
//! a concrete file, the launcher is found by asking the platform's path
//! search helper (`where.exe` on Windows, `which` elsewhere) and, failing
//! that, probing a conventional subpath under a well-known installation
//! root. The helper is an external process and gets a hard wait timeout so a
//! hung helper becomes a deterministic resolution failure.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long to wait for the path-search helper before killing it.
const LOCATOR_TIMEOUT: Duration = Duration::from_secs(2);

/// Launcher discovery seam. The default implementation talks to the real
/// machine; tests substitute a mock so resolution stays a pure function of
/// its inputs.
pub trait RuntimeLocator {
    /// Search the system path for the launcher executable.
    fn locate_on_path(&self) -> Option<PathBuf>;

    /// Probe the conventional install location as a last resort.
    fn install_root_fallback(&self) -> Option<PathBuf>;
}

/// Locator backed by the real machine.
pub struct SystemLocator;

impl RuntimeLocator for SystemLocator {
    fn locate_on_path(&self) -> Option<PathBuf> {
        let output = run_path_search_helper()?;
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .find(|candidate| matches_process_bitness(candidate))
    }

    fn install_root_fallback(&self) -> Option<PathBuf> {
        let root = if cfg!(windows) {
            PathBuf::from(std::env::var_os("ProgramFiles")?)
        } else {
            PathBuf::from(std::env::var_os("DOTNET_ROOT")?)
        };
        let candidate = if cfg!(windows) {
            root.join("dotnet").join("dotnet.exe")
        } else {
            root.join("dotnet")
        };
        candidate.is_file().then_some(candidate)
    }
}

/// Run the path-search helper, capturing its stdout.
///
/// The helper is waited on with a hard timeout and killed on expiry; a
/// non-zero exit (launcher not on the path) yields `None`.
fn run_path_search_helper() -> Option<String> {
    let (helper, launcher) = if cfg!(windows) {
        ("where.exe", "dotnet.exe")
    } else {
        ("which", "dotnet")
    };

    let mut child = Command::new(helper)
        .arg(launcher)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + LOCATOR_TIMEOUT;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    debug!("Path-search helper timed out; killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return None,
        }
    };

    if !status.success() {
        return None;
    }

    let mut stdout = child.stdout.take()?;
    let mut contents = String::new();
    use std::io::Read;
    stdout.read_to_string(&mut contents).ok()?;
    Some(contents)
}

/// Check that a candidate launcher's bitness matches this process.
///
/// A 32-bit worker process must not try to load a 64-bit runtime. On Linux
/// the ELF class byte answers this directly; elsewhere candidates are
/// accepted as-is.
#[cfg(target_os = "linux")]
fn matches_process_bitness(candidate: &Path) -> bool {
    use std::io::Read;

    let mut header = [0u8; 5];
    let Ok(mut file) = std::fs::File::open(candidate) else {
        return false;
    };
    if file.read_exact(&mut header).is_err() {
        return false;
    }
    if &header[0..4] != b"\x7fELF" {
        // Not ELF (e.g. a shell shim); assume it dispatches correctly.
        return true;
    }
    let is_64bit = header[4] == 2;
    is_64bit == cfg!(target_pointer_width = "64")
}

#[cfg(not(target_os = "linux"))]
fn matches_process_bitness(_candidate: &Path) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn bitness_check_rejects_wrong_elf_class() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let elf32 = dir.path().join("elf32");
        let elf64 = dir.path().join("elf64");
        std::fs::File::create(&elf32)
            .unwrap()
            .write_all(b"\x7fELF\x01rest")
            .unwrap();
        std::fs::File::create(&elf64)
            .unwrap()
            .write_all(b"\x7fELF\x02rest")
            .unwrap();

        if cfg!(target_pointer_width = "64") {
            assert!(!matches_process_bitness(&elf32));
            assert!(matches_process_bitness(&elf64));
        } else {
            assert!(matches_process_bitness(&elf32));
            assert!(!matches_process_bitness(&elf64));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn bitness_check_accepts_non_elf_shims() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let shim = dir.path().join("shim");
        std::fs::File::create(&shim)
            .unwrap()
            .write_all(b"#!/bin/sh\nexec dotnet \"$@\"\n")
            .unwrap();

        assert!(matches_process_bitness(&shim));
    }

    #[test]
    fn missing_candidate_never_matches() {
        #[cfg(target_os = "linux")]
        assert!(!matches_process_bitness(Path::new("/nonexistent/dotnet")));
    }
}

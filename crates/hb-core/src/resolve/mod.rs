//! Runtime resolution: given a configured process path and an application
//! root, locate the hosting component library and compute the argument
//! vector that starts the managed entry point.
//!
//! Resolution is pure discovery. It holds no shared state, every call is
//! independent and idempotent, and the result is owned by the caller, which
//! is expected to cache it. Machine access beyond the filesystem goes
//! through the [`RuntimeLocator`] seam so tests can mock it out.
//!
//! Two launch shapes exist:
//! - **Shared runtime**: the process path is the generic launcher command
//!   (`dotnet`). The launcher executable is located, its installation's
//!   `host/fxr/<version>/` directory is enumerated, and the highest
//!   version's hosting library is selected.
//! - **Standalone executable**: the process path is the application's own
//!   executable, with the managed assembly and the hosting library sitting
//!   next to it.

mod args;
mod locate;
mod version;

pub use args::{expand_env_vars, split_arguments};
pub use locate::{RuntimeLocator, SystemLocator};
pub use version::{RuntimeVersion, highest_version_directory};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// The bare launcher command name for the shared runtime.
const LAUNCHER_COMMAND: &str = "dotnet";

/// Subdirectory of the runtime installation holding versioned hosting
/// component directories.
const HOSTING_COMPONENT_SUBDIR: &[&str] = &["host", "fxr"];

/// Errors terminal for the current resolution attempt. The caller surfaces
/// them as an internal-error response; the next request retries from
/// scratch.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The shared runtime launcher could not be located by any strategy.
    #[error("runtime launcher not found (searched from {searched_from})")]
    RuntimeNotFound { searched_from: PathBuf },

    /// The installation has no hosting component directory at all.
    #[error("hosting component directory missing at {path}")]
    HostingComponentDirectoryMissing { path: PathBuf },

    /// The hosting component directory holds no version-named children.
    #[error("no runtime versions found under {path}")]
    NoVersionsFound { path: PathBuf },

    /// The selected version directory lacks the hosting component library.
    #[error("hosting component library missing at {path}")]
    HostingComponentLibraryMissing { path: PathBuf },

    /// A standalone executable has no sibling managed assembly.
    #[error("standalone managed assembly missing at {path}")]
    StandaloneAssemblyMissing { path: PathBuf },

    /// The process path is neither the launcher nor an existing executable.
    #[error("invalid process path {path}")]
    InvalidProcessPath { path: PathBuf },
}

/// Everything needed to start the managed entry point.
///
/// Immutable once produced; resolution is per-application and the caller
/// owns the result exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLaunch {
    /// Absolute path to the hosting component library to load.
    pub launcher_path: PathBuf,
    /// The launcher executable (shared runtime) or the managed assembly
    /// (standalone).
    pub target: PathBuf,
    /// Argument vector for the managed entry point, target first.
    pub args: Vec<String>,
}

/// Resolve a launch description for an application.
///
/// `process_path` and `raw_arguments` may contain environment-variable
/// references; both are expanded first. A relative process path is made
/// absolute against `application_root`.
pub fn resolve(
    process_path: &str,
    application_root: &Path,
    raw_arguments: &str,
) -> Result<ResolvedLaunch, ResolutionError> {
    resolve_with_locator(process_path, application_root, raw_arguments, &SystemLocator)
}

/// [`resolve`] with an explicit launcher locator.
pub fn resolve_with_locator(
    process_path: &str,
    application_root: &Path,
    raw_arguments: &str,
    locator: &dyn RuntimeLocator,
) -> Result<ResolvedLaunch, ResolutionError> {
    let expanded_path = expand_env_vars(process_path);
    let arguments = split_arguments(&expand_env_vars(raw_arguments));

    let absolute = if Path::new(&expanded_path).is_absolute() {
        PathBuf::from(&expanded_path)
    } else {
        application_root.join(&expanded_path)
    };

    if is_launcher_command(&expanded_path) {
        resolve_shared_runtime(absolute, application_root, arguments, locator)
    } else {
        resolve_standalone(absolute, arguments)
    }
}

/// Does the configured process path name the generic runtime launcher,
/// either as a bare command or as a full path ending in it?
fn is_launcher_command(process_path: &str) -> bool {
    let file_name = Path::new(process_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(process_path);
    file_name == LAUNCHER_COMMAND
        || file_name == format!("{LAUNCHER_COMMAND}{}", std::env::consts::EXE_SUFFIX)
}

fn resolve_shared_runtime(
    configured: PathBuf,
    application_root: &Path,
    arguments: Vec<String>,
    locator: &dyn RuntimeLocator,
) -> Result<ResolvedLaunch, ResolutionError> {
    let launcher = locate_launcher(&configured, locator)?;
    debug!("Resolved runtime launcher at {}", launcher.display());

    let library = hosting_component_library(&launcher)?;

    // The first argument is conventionally the application's assembly;
    // anchor it to the application root so the entry point does not depend
    // on the worker's working directory.
    let mut args = Vec::with_capacity(arguments.len() + 1);
    args.push(launcher.display().to_string());
    let mut arguments = arguments.into_iter();
    if let Some(first) = arguments.next() {
        args.push(absolutize_assembly(&first, application_root));
    }
    args.extend(arguments);

    Ok(ResolvedLaunch {
        launcher_path: library,
        target: launcher,
        args,
    })
}

fn absolutize_assembly(argument: &str, application_root: &Path) -> String {
    let path = Path::new(argument);
    if path.extension().is_some_and(|ext| ext == "dll") && !path.is_absolute() {
        application_root.join(path).display().to_string()
    } else {
        argument.to_string()
    }
}

/// Locate the concrete launcher executable, trying in order: the configured
/// path directly, the same path with the platform executable suffix, the
/// path-search helper, and the well-known installation root.
fn locate_launcher(
    configured: &Path,
    locator: &dyn RuntimeLocator,
) -> Result<PathBuf, ResolutionError> {
    if configured.is_file() {
        return Ok(configured.to_path_buf());
    }

    let suffix = std::env::consts::EXE_SUFFIX;
    if !suffix.is_empty() {
        let mut with_suffix = configured.as_os_str().to_os_string();
        with_suffix.push(suffix);
        let with_suffix = PathBuf::from(with_suffix);
        if with_suffix.is_file() {
            return Ok(with_suffix);
        }
    }

    locator
        .locate_on_path()
        .or_else(|| locator.install_root_fallback())
        .ok_or_else(|| ResolutionError::RuntimeNotFound {
            searched_from: configured.to_path_buf(),
        })
}

/// Find the hosting component library for an installed launcher: enumerate
/// `host/fxr/` next to it and take the highest version directory.
fn hosting_component_library(launcher: &Path) -> Result<PathBuf, ResolutionError> {
    let install_dir =
        launcher
            .parent()
            .ok_or_else(|| ResolutionError::HostingComponentDirectoryMissing {
                path: launcher.to_path_buf(),
            })?;

    let mut fxr_dir = install_dir.to_path_buf();
    for part in HOSTING_COMPONENT_SUBDIR {
        fxr_dir.push(part);
    }

    if !fxr_dir.is_dir() {
        return Err(ResolutionError::HostingComponentDirectoryMissing { path: fxr_dir });
    }

    let names: Vec<String> = std::fs::read_dir(&fxr_dir)
        .map_err(|_| ResolutionError::HostingComponentDirectoryMissing {
            path: fxr_dir.clone(),
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    if names.is_empty() {
        return Err(ResolutionError::NoVersionsFound { path: fxr_dir });
    }

    let selected = highest_version_directory(&names)
        .ok_or_else(|| ResolutionError::NoVersionsFound {
            path: fxr_dir.clone(),
        })?;
    debug!("Selected hosting component version {selected}");

    let library = fxr_dir.join(&selected).join(hosting_library_name());
    if !library.is_file() {
        return Err(ResolutionError::HostingComponentLibraryMissing { path: library });
    }
    Ok(library)
}

fn hosting_library_name() -> String {
    format!(
        "{}hostfxr{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

fn resolve_standalone(
    executable: PathBuf,
    arguments: Vec<String>,
) -> Result<ResolvedLaunch, ResolutionError> {
    if !executable.is_file() {
        return Err(ResolutionError::InvalidProcessPath { path: executable });
    }

    let assembly = executable.with_extension("dll");
    if !assembly.is_file() {
        return Err(ResolutionError::StandaloneAssemblyMissing { path: assembly });
    }

    let library = executable
        .parent()
        .map(|dir| dir.join(hosting_library_name()))
        .filter(|path| path.is_file())
        .ok_or_else(|| ResolutionError::HostingComponentLibraryMissing {
            path: executable
                .parent()
                .unwrap_or(Path::new(""))
                .join(hosting_library_name()),
        })?;

    let mut args = Vec::with_capacity(arguments.len() + 1);
    args.push(assembly.display().to_string());
    args.extend(arguments);

    Ok(ResolvedLaunch {
        launcher_path: library,
        target: assembly,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoLocator;

    impl RuntimeLocator for NoLocator {
        fn locate_on_path(&self) -> Option<PathBuf> {
            None
        }
        fn install_root_fallback(&self) -> Option<PathBuf> {
            None
        }
    }

    struct FixedLocator(PathBuf);

    impl RuntimeLocator for FixedLocator {
        fn locate_on_path(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }
        fn install_root_fallback(&self) -> Option<PathBuf> {
            None
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    /// Lay out a fake shared-runtime installation and return the launcher
    /// path.
    fn fake_installation(root: &Path, versions: &[&str]) -> PathBuf {
        let launcher = root.join(LAUNCHER_COMMAND);
        touch(&launcher);
        for version in versions {
            touch(
                &root
                    .join("host")
                    .join("fxr")
                    .join(version)
                    .join(hosting_library_name()),
            );
        }
        launcher
    }

    #[test]
    fn shared_runtime_with_absolute_launcher_path() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher = fake_installation(install.path(), &["2.2.0", "3.0.0-preview5"]);

        let launch = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "app.dll --flag",
            &NoLocator,
        )
        .unwrap();

        assert_eq!(launch.target, launcher);
        assert_eq!(
            launch.launcher_path,
            install
                .path()
                .join("host/fxr/2.2.0")
                .join(hosting_library_name())
        );
        assert_eq!(
            launch.args,
            vec![
                launcher.display().to_string(),
                app_root.path().join("app.dll").display().to_string(),
                "--flag".to_string(),
            ]
        );
    }

    #[test]
    fn highest_version_wins_over_prerelease() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher =
            fake_installation(install.path(), &["3.0.0-preview5", "3.0.0", "2.2.4", "junk"]);

        let launch = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "",
            &NoLocator,
        )
        .unwrap();

        assert!(launch.launcher_path.ends_with(
            Path::new("3.0.0").join(hosting_library_name())
        ));
    }

    #[test]
    fn bare_command_uses_locator() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher = fake_installation(install.path(), &["2.1.1"]);

        let launch = resolve_with_locator(
            LAUNCHER_COMMAND,
            app_root.path(),
            "app.dll",
            &FixedLocator(launcher.clone()),
        )
        .unwrap();

        assert_eq!(launch.target, launcher);
    }

    #[test]
    fn bare_command_without_any_runtime_is_not_found() {
        let app_root = TempDir::new().unwrap();

        let err =
            resolve_with_locator(LAUNCHER_COMMAND, app_root.path(), "app.dll", &NoLocator)
                .unwrap_err();

        assert!(matches!(err, ResolutionError::RuntimeNotFound { .. }));
    }

    #[test]
    fn missing_hosting_component_directory() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher = install.path().join(LAUNCHER_COMMAND);
        touch(&launcher);

        let err = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "",
            &NoLocator,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::HostingComponentDirectoryMissing { .. }
        ));
    }

    #[test]
    fn version_directory_without_library() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher = install.path().join(LAUNCHER_COMMAND);
        touch(&launcher);
        std::fs::create_dir_all(install.path().join("host/fxr/2.2.0")).unwrap();

        let err = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "",
            &NoLocator,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::HostingComponentLibraryMissing { .. }
        ));
    }

    #[test]
    fn no_parseable_versions() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher = install.path().join(LAUNCHER_COMMAND);
        touch(&launcher);
        std::fs::create_dir_all(install.path().join("host/fxr/not-a-version")).unwrap();

        let err = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "",
            &NoLocator,
        )
        .unwrap_err();

        assert!(matches!(err, ResolutionError::NoVersionsFound { .. }));
    }

    #[test]
    fn standalone_executable_with_siblings() {
        let app_root = TempDir::new().unwrap();
        let exe = app_root.path().join("app");
        touch(&exe);
        touch(&app_root.path().join("app.dll"));
        touch(&app_root.path().join(hosting_library_name()));

        let launch =
            resolve_with_locator("./app", app_root.path(), "--flag", &NoLocator).unwrap();

        assert_eq!(launch.target, app_root.path().join("app.dll"));
        assert_eq!(
            launch.launcher_path,
            app_root.path().join(hosting_library_name())
        );
        assert_eq!(
            launch.args,
            vec![
                app_root.path().join("app.dll").display().to_string(),
                "--flag".to_string(),
            ]
        );
    }

    #[test]
    fn standalone_without_assembly() {
        let app_root = TempDir::new().unwrap();
        touch(&app_root.path().join("app"));
        touch(&app_root.path().join(hosting_library_name()));

        let err = resolve_with_locator("./app", app_root.path(), "", &NoLocator).unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::StandaloneAssemblyMissing { .. }
        ));
    }

    #[test]
    fn standalone_without_hosting_library() {
        let app_root = TempDir::new().unwrap();
        touch(&app_root.path().join("app"));
        touch(&app_root.path().join("app.dll"));

        let err = resolve_with_locator("./app", app_root.path(), "", &NoLocator).unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::HostingComponentLibraryMissing { .. }
        ));
    }

    #[test]
    fn nonexistent_non_launcher_path_is_invalid() {
        let app_root = TempDir::new().unwrap();

        let err =
            resolve_with_locator("./missing-app", app_root.path(), "", &NoLocator).unwrap_err();

        assert!(matches!(err, ResolutionError::InvalidProcessPath { .. }));
    }

    #[test]
    fn resolution_is_repeatable() {
        let install = TempDir::new().unwrap();
        let app_root = TempDir::new().unwrap();
        let launcher = fake_installation(install.path(), &["2.2.0"]);

        let first = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "app.dll",
            &NoLocator,
        )
        .unwrap();
        let second = resolve_with_locator(
            launcher.to_str().unwrap(),
            app_root.path(),
            "app.dll",
            &NoLocator,
        )
        .unwrap();

        assert_eq!(first, second);
    }
}

//! Hosting configuration discovery and resolution.
//!
//! Options come from three layers, lowest priority first: built-in defaults,
//! an optional `hostbridge.toml` in the application root, and `HOSTBRIDGE_*`
//! environment variables. The process path and argument string are stored
//! verbatim here; environment-variable references inside them are expanded
//! later, by the resolver, so that resolution stays a pure function of its
//! inputs.

use crate::capture::CaptureMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Options controlling how the managed runtime is launched and observed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostingOptions {
    /// Process path or bare launcher command, e.g. `dotnet` or `./app`.
    pub process_path: String,
    /// Raw argument string passed to the managed entry point.
    pub arguments: String,
    /// Application root directory; relative paths resolve against this.
    pub application_root: PathBuf,
    /// Whether standard-stream capture writes to a log file.
    pub capture_enabled: bool,
    /// Log file prefix, relative to the application root.
    pub stdout_log_file: String,
    /// Explicit capture strategy override. When unset the strategy is
    /// derived from `capture_enabled` and the launch kind.
    pub capture_mode: Option<CaptureMode>,
}

impl Default for HostingOptions {
    fn default() -> Self {
        Self {
            process_path: "dotnet".to_string(),
            arguments: String::new(),
            application_root: PathBuf::from("."),
            capture_enabled: false,
            stdout_log_file: "logs/stdout".to_string(),
            capture_mode: None,
        }
    }
}

const CONFIG_FILE_NAME: &str = "hostbridge.toml";

/// Resolve hosting options for an application root.
///
/// Priority (highest to lowest):
/// 1. `HOSTBRIDGE_*` environment variables
/// 2. `hostbridge.toml` in the application root
/// 3. Defaults
pub fn resolve_options(application_root: &Path) -> Result<HostingOptions, ConfigError> {
    let mut options = HostingOptions {
        application_root: application_root.to_path_buf(),
        ..HostingOptions::default()
    };

    let config_path = application_root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        match load_options_file(&config_path) {
            Ok(file_options) => merge_options(&mut options, file_options),
            Err(err) => {
                // A broken config file should not take the application down;
                // defaults still describe a launchable app.
                warn!("Ignoring unreadable config at {config_path:?}: {err}");
            }
        }
    }

    apply_env_overrides(&mut options);
    options.application_root = application_root.to_path_buf();
    Ok(options)
}

/// Load options from a TOML file.
fn load_options_file(path: &Path) -> Result<HostingOptions, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge_options(base: &mut HostingOptions, file: HostingOptions) {
    base.process_path = file.process_path;
    base.arguments = file.arguments;
    base.capture_enabled = file.capture_enabled;
    base.stdout_log_file = file.stdout_log_file;
    if file.capture_mode.is_some() {
        base.capture_mode = file.capture_mode;
    }
}

fn apply_env_overrides(options: &mut HostingOptions) {
    if let Ok(path) = std::env::var("HOSTBRIDGE_PROCESS_PATH") {
        options.process_path = path;
    }

    if let Ok(arguments) = std::env::var("HOSTBRIDGE_ARGUMENTS") {
        options.arguments = arguments;
    }

    if let Ok(prefix) = std::env::var("HOSTBRIDGE_STDOUT_LOG") {
        options.stdout_log_file = prefix;
    }

    if let Ok(value) = std::env::var("HOSTBRIDGE_CAPTURE") {
        options.capture_enabled = matches!(value.as_str(), "1" | "true" | "on");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            env::remove_var("HOSTBRIDGE_PROCESS_PATH");
            env::remove_var("HOSTBRIDGE_ARGUMENTS");
            env::remove_var("HOSTBRIDGE_STDOUT_LOG");
            env::remove_var("HOSTBRIDGE_CAPTURE");
        }
    }

    #[test]
    #[serial]
    fn defaults_when_nothing_configured() {
        clear_env();
        let root = TempDir::new().unwrap();

        let options = resolve_options(root.path()).unwrap();

        assert_eq!(options.process_path, "dotnet");
        assert_eq!(options.arguments, "");
        assert!(!options.capture_enabled);
        assert_eq!(options.stdout_log_file, "logs/stdout");
        assert_eq!(options.application_root, root.path());
    }

    #[test]
    #[serial]
    fn config_file_overrides_defaults() {
        clear_env();
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE_NAME),
            r#"
process_path = "./app"
arguments = "app.dll --urls http://localhost:5000"
capture_enabled = true
stdout_log_file = "diag/out"
capture_mode = "pipe"
"#,
        )
        .unwrap();

        let options = resolve_options(root.path()).unwrap();

        assert_eq!(options.process_path, "./app");
        assert_eq!(options.arguments, "app.dll --urls http://localhost:5000");
        assert!(options.capture_enabled);
        assert_eq!(options.stdout_log_file, "diag/out");
        assert_eq!(options.capture_mode, Some(CaptureMode::Pipe));
    }

    #[test]
    #[serial]
    fn env_overrides_config_file() {
        clear_env();
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE_NAME),
            "process_path = \"./app\"\n",
        )
        .unwrap();

        unsafe {
            env::set_var("HOSTBRIDGE_PROCESS_PATH", "dotnet");
            env::set_var("HOSTBRIDGE_CAPTURE", "true");
        }

        let options = resolve_options(root.path()).unwrap();
        clear_env();

        assert_eq!(options.process_path, "dotnet");
        assert!(options.capture_enabled);
    }

    #[test]
    #[serial]
    fn malformed_config_falls_back_to_defaults() {
        clear_env();
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE_NAME), "not toml [[[").unwrap();

        let options = resolve_options(root.path()).unwrap();
        assert_eq!(options.process_path, "dotnet");
    }
}

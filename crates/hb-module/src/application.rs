//! First-request runtime load and application shutdown.

use hostbridge_core::ProcessContext;
use hostbridge_core::host::{ManagedRuntime, RuntimeStartError};
use hostbridge_core::resolve::{self, ResolutionError, ResolvedLaunch};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

/// Why the application could not be brought up.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    RuntimeStart(#[from] RuntimeStartError),

    /// A previous load attempt already failed in this process. The failure
    /// is sticky: the runtime cannot be loaded twice into one process, so
    /// requests fail fast until the process is recycled.
    #[error("the managed runtime previously failed to load in this process")]
    PreviouslyFailed,
}

#[derive(Debug)]
enum LoadState {
    NotLoaded,
    Loaded(ResolvedLaunch),
    Failed,
}

/// One hosted application inside this worker process.
///
/// The runtime is loaded lazily on the first request: resolution runs, the
/// capture session is activated so the runtime's earliest output is not
/// lost, and only then does the runtime start. The resolved launch is
/// cached for the lifetime of the process.
pub struct HostedApplication {
    context: Arc<ProcessContext>,
    runtime: Arc<dyn ManagedRuntime>,
    load: Mutex<LoadState>,
}

impl HostedApplication {
    pub fn new(context: Arc<ProcessContext>, runtime: Arc<dyn ManagedRuntime>) -> Self {
        Self {
            context,
            runtime,
            load: Mutex::new(LoadState::NotLoaded),
        }
    }

    pub fn context(&self) -> &Arc<ProcessContext> {
        &self.context
    }

    pub fn runtime(&self) -> &Arc<dyn ManagedRuntime> {
        &self.runtime
    }

    /// Load the runtime if this is the first request to reach the
    /// application. Later callers see the cached result, success or
    /// failure alike.
    pub fn ensure_loaded(&self) -> Result<(), LoadError> {
        let mut load = self.load.lock().unwrap();
        match &*load {
            LoadState::Loaded(_) => return Ok(()),
            LoadState::Failed => return Err(LoadError::PreviouslyFailed),
            LoadState::NotLoaded => {}
        }

        match self.load_runtime() {
            Ok(launch) => {
                *load = LoadState::Loaded(launch);
                Ok(())
            }
            Err(err) => {
                *load = LoadState::Failed;
                error!("Managed runtime load failed: {err}");
                self.report_captured_output();
                Err(err)
            }
        }
    }

    fn load_runtime(&self) -> Result<ResolvedLaunch, LoadError> {
        let options = self.context.options();
        let launch = resolve::resolve(
            &options.process_path,
            &options.application_root,
            &options.arguments,
        )?;
        info!(
            launcher = %launch.launcher_path.display(),
            "Resolved managed runtime launch"
        );

        // Capture must be live before the runtime produces its first byte
        // of output.
        self.context.activate_capture();
        self.runtime.start(&launch)?;
        self.context.notify_startup_complete();
        Ok(launch)
    }

    /// The cached launch, once loading succeeded.
    pub fn resolved_launch(&self) -> Option<ResolvedLaunch> {
        match &*self.load.lock().unwrap() {
            LoadState::Loaded(launch) => Some(launch.clone()),
            _ => None,
        }
    }

    /// Tear the application down, releasing the captured streams. Whatever
    /// the runtime wrote is logged as the shutdown diagnostic.
    pub fn shutdown(&self) {
        self.report_captured_output();
        self.context.stop_capture();
    }

    fn report_captured_output(&self) {
        if let Some(bytes) = self.context.captured_output() {
            info!(
                "Managed runtime output:\n{}",
                String::from_utf8_lossy(&bytes)
            );
        }
    }
}

//! Module registration and process-global lifecycle notifications.

use crate::application::HostedApplication;
use crate::factory::HandlerFactory;
use anyhow::Context as _;
use hostbridge_core::host::{HostServer, ManagedRuntime};
use hostbridge_core::{ProcessContext, config, logging};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Process-wide events the host delivers to a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalNotification {
    /// The application's configuration changed on disk. The loaded runtime
    /// cannot be re-configured in place; the worker process must be
    /// recycled, so the module drains and shuts down.
    ConfigurationChange,
    /// The host stopped listening for new requests.
    StopListening,
}

/// The registered module: one hosted application, its handler factory, and
/// the global-notification sink.
pub struct BridgeModule {
    application: Arc<HostedApplication>,
    factory: HandlerFactory,
    shutting_down: AtomicBool,
}

impl BridgeModule {
    pub fn new(application: Arc<HostedApplication>) -> Self {
        Self {
            factory: HandlerFactory::new(Arc::clone(&application)),
            application,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn factory(&self) -> &HandlerFactory {
        &self.factory
    }

    pub fn application(&self) -> &Arc<HostedApplication> {
        &self.application
    }

    /// Deliver a process-global notification. Both notifications end in
    /// shutdown; the shutdown itself runs at most once no matter how many
    /// notifications arrive.
    pub fn handle_global(&self, notification: GlobalNotification) {
        match notification {
            GlobalNotification::ConfigurationChange => {
                info!("Configuration changed; recycling the worker process");
            }
            GlobalNotification::StopListening => {
                info!("Host stopped listening; shutting the application down");
            }
        }
        self.begin_shutdown();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::AcqRel) {
            self.application.shutdown();
        }
    }
}

/// Entry point for the host: resolve configuration for the application
/// root and register the module that will serve it.
pub fn register_module(
    application_root: &Path,
    host: Arc<dyn HostServer>,
    runtime: Arc<dyn ManagedRuntime>,
) -> anyhow::Result<BridgeModule> {
    logging::init();

    let options = config::resolve_options(application_root)
        .with_context(|| format!("resolving hosting options for {}", application_root.display()))?;
    info!(
        root = %application_root.display(),
        process_path = %options.process_path,
        "Registering hosting module"
    );

    let context = Arc::new(ProcessContext::new(options, host));
    let application = Arc::new(HostedApplication::new(context, runtime));
    Ok(BridgeModule::new(application))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, FakeRuntime};
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn registration_picks_up_the_config_file() {
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join("hostbridge.toml"),
            "process_path = \"./app\"\n",
        )
        .unwrap();

        let module = register_module(
            root.path(),
            Arc::new(FakeHost::console()),
            Arc::new(FakeRuntime::default()),
        )
        .unwrap();

        assert_eq!(
            module.application().context().options().process_path,
            "./app"
        );
        assert!(!module.is_shutting_down());
    }

    #[test]
    #[serial]
    fn every_global_notification_drains_the_module() {
        let root = TempDir::new().unwrap();
        let module = register_module(
            root.path(),
            Arc::new(FakeHost::console()),
            Arc::new(FakeRuntime::default()),
        )
        .unwrap();

        module.handle_global(GlobalNotification::ConfigurationChange);
        assert!(module.is_shutting_down());

        // Repeated notifications are absorbed.
        module.handle_global(GlobalNotification::StopListening);
        assert!(module.is_shutting_down());
    }
}

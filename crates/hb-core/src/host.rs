//! Seams between the bridge and its surroundings.
//!
//! The core never touches a concrete server or runtime type. The host
//! server implements [`HostServer`], [`Connection`] and [`ResponseChannel`]
//! over its own primitives; the loaded runtime is driven through
//! [`ManagedRuntime`]. Everything here is object-safe so the bridge can
//! hold them as trait objects.

use crate::request::{NotificationOutcome, RequestHandler};
use crate::resolve::ResolvedLaunch;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// The managed runtime failed to start inside this process.
///
/// Start failures are terminal for the application: the runtime cannot be
/// retried in-process, so every later request is failed without another
/// load attempt.
#[derive(Debug, Error)]
#[error("managed runtime failed to start: {message}")]
pub struct RuntimeStartError {
    pub message: String,
}

impl RuntimeStartError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Process-level facts only the host server knows.
pub trait HostServer: Send + Sync {
    /// Whether the process was launched from a command line rather than by
    /// a server service. Console launches skip stream capture since output
    /// is already visible.
    fn is_command_line_launch(&self) -> bool;
}

/// One client connection, potentially carrying many requests when kept
/// alive. The keyed context storage lives as long as the connection and is
/// where the per-connection disconnect slot is stored.
pub trait Connection: Send + Sync {
    fn is_connected(&self) -> bool;

    fn get_context(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>>;

    fn set_context(&self, key: &str, value: Arc<dyn Any + Send + Sync>);
}

/// The response side of one request.
pub trait ResponseChannel: Send + Sync {
    fn set_status(&self, code: u16, reason: &str, sub_code: u32, cause: i32);

    /// Resume the host's request pipeline after an asynchronous completion.
    fn post_completion(&self, bytes_transferred: u64);
}

/// The loaded managed runtime, as the bridge drives it.
pub trait ManagedRuntime: Send + Sync {
    /// Load and start the runtime described by `launch`. Called at most
    /// once per process.
    fn start(&self, launch: &ResolvedLaunch) -> Result<(), RuntimeStartError>;

    /// Hand a new request to the runtime.
    fn execute_request(&self, handler: &Arc<RequestHandler>) -> NotificationOutcome;

    /// An asynchronous operation for `handler` finished.
    fn async_completion(
        &self,
        handler: &Arc<RequestHandler>,
        bytes_transferred: u64,
        completion_result: i32,
    ) -> NotificationOutcome;

    /// Cancel an in-flight request. Best-effort; a completion may still be
    /// delivered afterwards.
    fn cancel_request(&self, handler: &RequestHandler);
}

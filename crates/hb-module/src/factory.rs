//! Per-request handler creation.

use crate::application::{HostedApplication, LoadError};
use hostbridge_core::host::{Connection, ResponseChannel};
use hostbridge_core::request::{CompletionOutcome, NotificationOutcome, RequestHandler};
use std::sync::Arc;
use tracing::error;

/// Failure causes reported with a synthesized error response, so that the
/// status line alone distinguishes "could not find the runtime" from "the
/// runtime would not start".
const CAUSE_RESOLUTION: i32 = 1;
const CAUSE_RUNTIME_START: i32 = 2;
const CAUSE_PREVIOUS_FAILURE: i32 = 3;

/// Builds one [`BridgeRequestHandler`] per incoming request, all bound to
/// the same hosted application.
pub struct HandlerFactory {
    application: Arc<HostedApplication>,
}

impl HandlerFactory {
    pub fn new(application: Arc<HostedApplication>) -> Self {
        Self { application }
    }

    pub fn create(
        &self,
        connection: Arc<dyn Connection>,
        response: Arc<dyn ResponseChannel>,
    ) -> BridgeRequestHandler {
        let inner = RequestHandler::new(
            Arc::clone(self.application.runtime()),
            response,
            connection,
        );
        BridgeRequestHandler {
            application: Arc::clone(&self.application),
            inner,
        }
    }
}

/// A request handler with the first-request load check in front.
///
/// If the runtime cannot be loaded, the request is answered with a
/// synthesized internal error and finished immediately; it never reaches
/// the runtime and is never retried within this process.
pub struct BridgeRequestHandler {
    application: Arc<HostedApplication>,
    inner: Arc<RequestHandler>,
}

impl BridgeRequestHandler {
    pub fn on_execute(&self) -> NotificationOutcome {
        if let Err(err) = self.application.ensure_loaded() {
            error!("Failing request without reaching the runtime: {err}");
            let cause = match err {
                LoadError::Resolution(_) => CAUSE_RESOLUTION,
                LoadError::RuntimeStart(_) => CAUSE_RUNTIME_START,
                LoadError::PreviouslyFailed => CAUSE_PREVIOUS_FAILURE,
            };
            self.inner.synthesize_internal_error(cause);
            return NotificationOutcome::FinishRequest;
        }

        self.inner.on_execute()
    }

    pub fn on_async_completion(
        &self,
        bytes_transferred: u64,
        completion_result: i32,
    ) -> NotificationOutcome {
        self.inner
            .on_async_completion(bytes_transferred, completion_result)
    }

    /// The runtime finished this request.
    pub fn indicate_complete(&self, outcome: CompletionOutcome, bytes_transferred: u64) {
        if let Err(err) = self.inner.indicate_complete(outcome, bytes_transferred) {
            error!("Request completion could not be recorded: {err}");
        }
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.inner
    }
}

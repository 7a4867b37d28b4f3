//! The per-request handler.

use super::disconnect::{DISCONNECT_CONTEXT_KEY, DisconnectContext};
use crate::host::{Connection, ManagedRuntime, ResponseChannel};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};
use thiserror::Error;
use tracing::{debug, error};

/// What the handler tells the host to do next with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Keep running further notification handlers.
    Continue,
    /// The request completes asynchronously; the host will be resumed via
    /// a completion.
    Pending,
    /// The request is done; finish it now.
    FinishRequest,
}

/// How the managed runtime finished the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Success,
    Failure,
}

/// Coordination bugs. These indicate a logic defect, not an expected
/// runtime condition: debug builds assert, release builds log and carry
/// on best-effort.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The disconnect slot was armed while it already held a handler.
    #[error("disconnect slot already armed for this connection")]
    SlotAlreadyArmed,
}

#[derive(Debug)]
struct HandlerState {
    completed: bool,
    outcome: Option<CompletionOutcome>,
    bytes_transferred: u64,
}

/// One in-flight request against the hosted runtime.
///
/// Held in an `Arc`: the request-processing call stack and the
/// per-connection disconnect slot can both own a reference, and the
/// handler is reclaimed when the last clone drops. Destruction with the
/// disconnect slot still armed is a coordination bug and debug-asserts.
pub struct RequestHandler {
    runtime: Arc<dyn ManagedRuntime>,
    response: Arc<dyn ResponseChannel>,
    connection: Arc<dyn Connection>,
    /// Shared/exclusive request-level lock; `terminate` takes it
    /// exclusively before cancelling into the runtime.
    request_lock: RwLock<()>,
    state: Mutex<HandlerState>,
    /// Opaque context handed over by the managed runtime.
    managed_context: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
    /// Which thread is currently inside `terminate`, if any. Lets a
    /// completion delivered reentrantly by the cancellation itself skip
    /// re-acquiring the lock that thread already holds.
    terminating_thread: Mutex<Option<ThreadId>>,
    armed: AtomicBool,
}

impl RequestHandler {
    pub fn new(
        runtime: Arc<dyn ManagedRuntime>,
        response: Arc<dyn ResponseChannel>,
        connection: Arc<dyn Connection>,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            response,
            connection,
            request_lock: RwLock::new(()),
            state: Mutex::new(HandlerState {
                completed: false,
                outcome: None,
                bytes_transferred: 0,
            }),
            managed_context: Mutex::new(None),
            terminating_thread: Mutex::new(None),
            armed: AtomicBool::new(false),
        })
    }

    /// First execution of the request: arm the connection's disconnect
    /// slot, then hand the request to the managed runtime.
    pub fn on_execute(self: &Arc<Self>) -> NotificationOutcome {
        if self.connection.is_connected() {
            if let Err(err) = self.arm_disconnect() {
                error!("Could not arm disconnect notification: {err}");
            }
        } else {
            debug!("Connection already gone before execution; not arming disconnect");
        }

        self.runtime.execute_request(self)
    }

    /// An asynchronous operation finished; let the runtime continue the
    /// request.
    pub fn on_async_completion(
        self: &Arc<Self>,
        bytes_transferred: u64,
        completion_result: i32,
    ) -> NotificationOutcome {
        self.runtime
            .async_completion(self, bytes_transferred, completion_result)
    }

    /// Cancel the in-flight request. Best-effort: the runtime may still
    /// deliver a completion afterwards, which the idempotent
    /// [`indicate_complete`](Self::indicate_complete) absorbs.
    pub fn terminate(&self, client_initiated: bool) {
        debug!(client_initiated, "Terminating request");

        *self.terminating_thread.lock().unwrap() = Some(thread::current().id());
        {
            let _exclusive = self.request_lock.write().unwrap();
            let completed = self.state.lock().unwrap().completed;
            if !completed {
                self.runtime.cancel_request(self);
            }
        }
        *self.terminating_thread.lock().unwrap() = None;
    }

    /// The managed runtime finished the request. Idempotent: the second
    /// and later calls (e.g. a completion racing a termination) are
    /// no-ops.
    pub fn indicate_complete(
        &self,
        outcome: CompletionOutcome,
        bytes_transferred: u64,
    ) -> Result<(), CoordinationError> {
        // A cancellation can synchronously re-enter here on the same
        // thread that already holds the request lock in `terminate`.
        let reentrant =
            *self.terminating_thread.lock().unwrap() == Some(thread::current().id());
        let _exclusive = if reentrant {
            None
        } else {
            Some(self.request_lock.write().unwrap())
        };

        {
            let mut state = self.state.lock().unwrap();
            if state.completed {
                return Ok(());
            }
            state.completed = true;
            state.outcome = Some(outcome);
            state.bytes_transferred = bytes_transferred;
        }

        self.disarm_disconnect();
        self.response.post_completion(bytes_transferred);
        Ok(())
    }

    /// Synthesize an internal-error response for a request that could not
    /// reach the runtime at all (e.g. resolution failed on first request).
    pub fn synthesize_internal_error(&self, cause: i32) {
        self.response
            .set_status(500, "Internal Server Error", 0, cause);
        let mut state = self.state.lock().unwrap();
        state.completed = true;
        state.outcome = Some(CompletionOutcome::Failure);
    }

    /// The disconnect context for this handler's connection, creating and
    /// storing one on first use. Kept-alive connections reuse it across
    /// requests.
    pub fn disconnect_context(&self) -> Arc<DisconnectContext> {
        if let Some(existing) = self
            .connection
            .get_context(DISCONNECT_CONTEXT_KEY)
            .and_then(|any| any.downcast::<DisconnectContext>().ok())
        {
            return existing;
        }
        let created = Arc::new(DisconnectContext::new());
        self.connection
            .set_context(DISCONNECT_CONTEXT_KEY, created.clone());
        created
    }

    fn arm_disconnect(self: &Arc<Self>) -> Result<(), CoordinationError> {
        self.disconnect_context().arm(Arc::clone(self))
    }

    fn disarm_disconnect(&self) {
        if let Some(ctx) = self
            .connection
            .get_context(DISCONNECT_CONTEXT_KEY)
            .and_then(|any| any.downcast::<DisconnectContext>().ok())
        {
            ctx.disarm();
        }
    }

    /// Opaque per-request context supplied by the managed runtime.
    pub fn managed_context(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.managed_context.lock().unwrap().clone()
    }

    pub fn set_managed_context(&self, context: Arc<dyn Any + Send + Sync>) {
        *self.managed_context.lock().unwrap() = Some(context);
    }

    /// Whether the runtime has finished this request.
    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().completed
    }

    /// Recorded outcome and byte count, once complete.
    pub fn completion(&self) -> Option<(CompletionOutcome, u64)> {
        let state = self.state.lock().unwrap();
        state
            .outcome
            .map(|outcome| (outcome, state.bytes_transferred))
    }

    pub(super) fn mark_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
    }
}

impl Drop for RequestHandler {
    fn drop(&mut self) {
        // The disconnect slot must have been emptied (by completion or by
        // the disconnect notification) before the last reference drops; a
        // still-armed handler here means a reference was leaked or freed
        // twice somewhere.
        debug_assert!(
            !self.armed.load(Ordering::Acquire),
            "request handler dropped while still armed for disconnect"
        );
    }
}

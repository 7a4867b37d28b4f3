//! The per-connection disconnect slot.

use super::handler::{CoordinationError, RequestHandler};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Key under which the [`DisconnectContext`] is stored in the connection's
/// keyed context storage. A kept-alive connection reuses the same context
/// across requests.
pub const DISCONNECT_CONTEXT_KEY: &str = "hostbridge.disconnect";

/// Holds at most one reference to the handler currently armed for
/// disconnect on a connection.
///
/// The slot is the single source of truth for "should the disconnect
/// callback still fire". Arming stores an owning reference; normal
/// completion and disconnect notification both consume it by atomically
/// taking the slot, so whichever fires first wins and the loser observes
/// an empty slot and does nothing. That rules out double-termination and
/// reference leaks by construction.
pub struct DisconnectContext {
    slot: Mutex<Option<Arc<RequestHandler>>>,
}

impl DisconnectContext {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Arm `handler` for disconnect. Precondition: the slot is empty — a
    /// prior request on this connection must have disarmed first. A
    /// non-empty slot is a coordination bug: asserted in debug builds,
    /// reported and skipped in release.
    pub fn arm(&self, handler: Arc<RequestHandler>) -> Result<(), CoordinationError> {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            // Release the lock before the debug assertion fires so a
            // caught panic cannot poison the slot.
            drop(slot);
            debug_assert!(false, "disconnect slot armed while already holding a handler");
            return Err(CoordinationError::SlotAlreadyArmed);
        }
        handler.mark_armed(true);
        *slot = Some(handler);
        Ok(())
    }

    /// Normal completion: release the armed handler without any
    /// cancellation. Returns whether this call consumed the slot.
    pub fn disarm(&self) -> bool {
        match self.take() {
            Some(handler) => {
                handler.mark_armed(false);
                true
            }
            None => false,
        }
    }

    /// Client disconnect: consume the slot and cancel the in-flight
    /// request. This is the only path that actively cancels work.
    pub fn notify_disconnect(&self) {
        if let Some(handler) = self.take() {
            debug!("Client disconnected with a request in flight; terminating");
            handler.mark_armed(false);
            handler.terminate(true);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    fn take(&self) -> Option<Arc<RequestHandler>> {
        self.slot.lock().unwrap().take()
    }
}

impl Default for DisconnectContext {
    fn default() -> Self {
        Self::new()
    }
}

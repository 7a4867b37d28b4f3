//! Per-request handler lifetime and disconnect coordination.
//!
//! A handler may be reachable from the request-processing call stack and
//! from a disconnect-notification callback on an arbitrary thread at the
//! same time. Shared ownership is an `Arc<RequestHandler>`; the last clone
//! dropped reclaims the handler. The only cross-thread contention point is
//! the [`DisconnectContext`] slot, a single-owner takeable cell: normal
//! completion and client disconnect each atomically take the slot, so
//! exactly one of them ever acts on the armed handler.

mod disconnect;
mod handler;

pub use disconnect::{DISCONNECT_CONTEXT_KEY, DisconnectContext};
pub use handler::{
    CompletionOutcome, CoordinationError, NotificationOutcome, RequestHandler,
};

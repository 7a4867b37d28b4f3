//! Core hosting bridge for running a managed web runtime inside a host
//! server's worker process.
//!
//! The crate solves one problem end to end: the first request arriving at an
//! application must discover and load a runtime whose installed version is
//! unknown, capture everything that runtime writes to the standard streams
//! (including output produced before any structured logging exists), and then
//! coordinate each request's lifetime against asynchronous client-disconnect
//! notifications without ever freeing a handler that another thread can
//! still reach.
//!
//! The three components, leaves first:
//! - [`resolve`] — pure discovery: locate the runtime launcher library and
//!   compute the argument vector for the managed entry point.
//! - [`capture`] — process-wide standard-stream capture with interchangeable
//!   null/file/pipe strategies behind one trait.
//! - [`request`] — per-request handler lifetime and the disconnect-versus-
//!   completion race, resolved by a single-owner takeable slot.
//!
//! Host-server specifics live behind the narrow traits in [`host`]; the core
//! never depends on a concrete server type.

pub mod capture;
pub mod config;
pub mod context;
pub mod host;
pub mod logging;
pub mod request;
pub mod resolve;

pub use capture::{CaptureError, CaptureMode, OutputCapture};
pub use config::HostingOptions;
pub use context::ProcessContext;
pub use request::{
    CompletionOutcome, DisconnectContext, NotificationOutcome, RequestHandler,
};
pub use resolve::{ResolutionError, ResolvedLaunch};

//! Host-facing surface of the hosting bridge.
//!
//! The host server registers one [`BridgeModule`] per worker process via
//! [`register_module`]. The module owns the [`HostedApplication`] (lazy
//! first-request runtime load), hands out per-request handlers through its
//! [`HandlerFactory`], and receives process-global lifecycle notifications.
//!
//! Everything server-specific arrives through the trait objects defined in
//! `hostbridge-core`; this crate contains no transport code of its own.

pub mod application;
pub mod factory;
pub mod notifications;

#[cfg(test)]
mod testing;

pub use application::{HostedApplication, LoadError};
pub use factory::{BridgeRequestHandler, HandlerFactory};
pub use notifications::{BridgeModule, GlobalNotification, register_module};

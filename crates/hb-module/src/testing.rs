//! Shared fakes for the module-level tests.

use hostbridge_core::host::{
    Connection, HostServer, ManagedRuntime, ResponseChannel, RuntimeStartError,
};
use hostbridge_core::request::{NotificationOutcome, RequestHandler};
use hostbridge_core::resolve::ResolvedLaunch;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct FakeHost {
    command_line: bool,
}

impl FakeHost {
    /// A console launch: capture selection degrades to the null strategy,
    /// so tests never redirect the real descriptors.
    pub fn console() -> Self {
        Self { command_line: true }
    }
}

impl HostServer for FakeHost {
    fn is_command_line_launch(&self) -> bool {
        self.command_line
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    pub starts: AtomicUsize,
    pub executes: AtomicUsize,
    pub cancels: AtomicUsize,
    fail_start: bool,
}

impl FakeRuntime {
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }
}

impl ManagedRuntime for FakeRuntime {
    fn start(&self, _launch: &ResolvedLaunch) -> Result<(), RuntimeStartError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            Err(RuntimeStartError::new("simulated start failure"))
        } else {
            Ok(())
        }
    }

    fn execute_request(&self, _handler: &Arc<RequestHandler>) -> NotificationOutcome {
        self.executes.fetch_add(1, Ordering::SeqCst);
        NotificationOutcome::Pending
    }

    fn async_completion(
        &self,
        _handler: &Arc<RequestHandler>,
        _bytes_transferred: u64,
        _completion_result: i32,
    ) -> NotificationOutcome {
        NotificationOutcome::FinishRequest
    }

    fn cancel_request(&self, _handler: &RequestHandler) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeResponse {
    pub status: Mutex<Option<(u16, String, u32, i32)>>,
    pub completions: AtomicUsize,
}

impl ResponseChannel for FakeResponse {
    fn set_status(&self, code: u16, reason: &str, sub_code: u32, cause: i32) {
        *self.status.lock().unwrap() = Some((code, reason.to_string(), sub_code, cause));
    }

    fn post_completion(&self, _bytes_transferred: u64) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeConnection {
    pub connected: AtomicBool,
    contexts: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl FakeConnection {
    pub fn connected() -> Arc<Self> {
        let conn = Self::default();
        conn.connected.store(true, Ordering::SeqCst);
        Arc::new(conn)
    }
}

impl Connection for FakeConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_context(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.contexts.lock().unwrap().get(key).cloned()
    }

    fn set_context(&self, key: &str, value: Arc<dyn Any + Send + Sync>) {
        self.contexts.lock().unwrap().insert(key.to_string(), value);
    }
}

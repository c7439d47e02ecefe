//! In-memory state of one supervisor run, shared with the watchdog and the
//! termination handler.

use parking_lot::Mutex;
use tokio::sync::watch;

/// Something the termination handler can shut down without awaiting it.
pub trait Handle: Send {
    fn close(&mut self);
}

/// A collaborator child process, stopped by pid.
pub struct ChildHandle {
    label: &'static str,
    pid: Option<u32>,
}

impl ChildHandle {
    pub fn new(label: &'static str, pid: Option<u32>) -> Self {
        Self { label, pid }
    }
}

impl Handle for ChildHandle {
    fn close(&mut self) {
        if let Some(pid) = self.pid.take() {
            let delivered = crate::probe::terminate(pid);
            tracing::debug!(pid, delivered, "closing {}", self.label);
        }
    }
}

/// The HTTP dev server, stopped through its shutdown channel.
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
}

impl ServerHandle {
    pub fn new(shutdown: watch::Sender<bool>) -> Self {
        Self { shutdown }
    }
}

impl Handle for ServerHandle {
    fn close(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[derive(Default)]
pub struct RunState {
    branch: Mutex<Option<String>>,
    watcher: Mutex<Option<Box<dyn Handle>>>,
    proxy: Mutex<Option<Box<dyn Handle>>>,
    server: Mutex<Option<Box<dyn Handle>>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(&self) -> Option<String> {
        self.branch.lock().clone()
    }

    pub fn set_branch(&self, branch: Option<String>) {
        *self.branch.lock() = branch;
    }

    pub fn set_watcher(&self, handle: Box<dyn Handle>) {
        *self.watcher.lock() = Some(handle);
    }

    pub fn set_proxy(&self, handle: Box<dyn Handle>) {
        *self.proxy.lock() = Some(handle);
    }

    pub fn set_server(&self, handle: Box<dyn Handle>) {
        *self.server.lock() = Some(handle);
    }

    /// Close every handle that is still registered. Safe to call repeatedly.
    pub fn close_all(&self) {
        for slot in [&self.server, &self.proxy, &self.watcher] {
            if let Some(mut handle) = slot.lock().take() {
                handle.close();
            }
        }
    }
}

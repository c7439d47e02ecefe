//! Termination handler: the single cleanup path run on every exit.
//!
//! Only the process whose pid is recorded in the registry cleans up, so a
//! short-lived task such as `tasker status` exiting never tears down a
//! running supervisor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tasker_core::Registry;

use crate::output;
use crate::supervisor::latch::Latch;
use crate::supervisor::state::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    Normal,
    Fault,
    /// OS signal number
    Signal(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    AlreadyFired,
    NotOwner,
    CleanedUp { pid: u32 },
}

pub struct TerminationHandler {
    fired: Latch,
    registry_path: PathBuf,
    indent: String,
    preview_dir: PathBuf,
    own_pid: u32,
    state: Arc<RunState>,
}

impl TerminationHandler {
    pub fn new(
        registry_path: PathBuf,
        indent: impl Into<String>,
        preview_dir: PathBuf,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            fired: Latch::new(),
            registry_path,
            indent: indent.into(),
            preview_dir,
            own_pid: std::process::id(),
            state,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_own_pid(mut self, pid: u32) -> Self {
        self.own_pid = pid;
        self
    }

    /// Run cleanup for `trigger`. Only the first call does anything.
    pub fn fire(&self, trigger: ExitTrigger) -> TerminationOutcome {
        if !self.fired.fire() {
            return TerminationOutcome::AlreadyFired;
        }

        let mut registry = match Registry::read(&self.registry_path) {
            Ok(registry) => registry.with_indent(self.indent.clone()),
            Err(e) => {
                tracing::warn!("termination could not read registry: {}", e);
                return TerminationOutcome::NotOwner;
            }
        };
        let recorded = registry.recorded_pid();
        if recorded != Some(self.own_pid) {
            tracing::debug!(?recorded, own = self.own_pid, "not the owning instance");
            return TerminationOutcome::NotOwner;
        }
        let pid = self.own_pid;

        if let Err(e) = clear_dir(&self.preview_dir) {
            tracing::warn!("failed to remove previews in {}: {}", self.preview_dir.display(), e);
        }

        match trigger {
            ExitTrigger::Fault => output::error(&format!(
                "Error caused instance {} to close.",
                output::highlight(pid)
            )),
            _ => output::success(&format!("Tasker instance {} stopped.", output::highlight(pid))),
        }

        let cleared = registry
            .set_process(None)
            .and_then(|()| registry.write());
        if let Err(e) = cleared {
            tracing::warn!("failed to clear registry record: {}", e);
        }

        self.state.set_branch(None);
        self.state.close_all();

        if let ExitTrigger::Signal(signal) = trigger {
            redeliver(pid, signal);
        }
        TerminationOutcome::CleanedUp { pid }
    }
}

/// Remove everything inside `dir`, hidden entries included. The directory
/// itself stays.
fn clear_dir(dir: &Path) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn redeliver(pid: u32, signal: i32) {
    // Restore the default disposition first, otherwise the signal would only
    // re-enter our own handler.
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::kill(pid as i32, signal);
    }
}

#[cfg(not(unix))]
fn redeliver(_pid: u32, _signal: i32) {}

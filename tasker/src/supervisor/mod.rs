//! Dev server supervisor.
//!
//! Drives one run after the instance has been registered: pre-format pass,
//! then the bundler (single build, watch, or watch plus dev server) and the
//! live-reload proxy. A branch switch reported by the watchdog ends the run
//! at whatever stage it is in.

pub mod bundler;
pub mod latch;
pub mod proxy;
pub mod server;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use tasker_core::{Mode, PortSet};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::formatter::{Formatter, Selection};
use crate::git::{BranchSource, GitCli};
use crate::output;
use crate::settings::Settings;
use crate::watchdog::BranchSwitch;
use bundler::{BuildEvent, Bundler, BundlerConfig, BundlerError};
use latch::Latch;
use server::ServerError;
use state::{ChildHandle, RunState, ServerHandle};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Bundler watcher exited before the first build ({0})")]
    WatcherFailed(String),

    #[error("Bundler watcher exited ({0})")]
    WatcherExited(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Single-shot production build finished
    Built,
    BranchSwitched(BranchSwitch),
}

pub struct Supervisor<B: Bundler> {
    settings: Settings,
    project_dir: PathBuf,
    mode: Mode,
    ports: PortSet,
    bundler: B,
    state: Arc<RunState>,
    completed: Latch,
}

impl<B: Bundler> Supervisor<B> {
    pub fn new(
        settings: Settings,
        project_dir: PathBuf,
        mode: Mode,
        ports: PortSet,
        bundler: B,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            settings,
            project_dir,
            mode,
            ports,
            bundler,
            state,
            completed: Latch::new(),
        }
    }

    /// Run until the production build finishes, a branch switch arrives, or
    /// a collaborator fails.
    pub async fn run(
        &self,
        mut switch_rx: mpsc::Receiver<BranchSwitch>,
    ) -> Result<Outcome, SupervisorError> {
        let started = tokio::select! {
            biased;
            Some(switch) = switch_rx.recv() => return Ok(Outcome::BranchSwitched(switch)),
            started = self.start() => started?,
        };
        let Some(mut events) = started else {
            return Ok(Outcome::Built);
        };

        loop {
            tokio::select! {
                biased;
                Some(switch) = switch_rx.recv() => return Ok(Outcome::BranchSwitched(switch)),
                event = events.recv() => match event {
                    Some(BuildEvent::Built) => {
                        if self.mode == Mode::Development {
                            self.complete();
                        } else {
                            tracing::debug!("rebuilt");
                        }
                    }
                    Some(BuildEvent::Failed(summary)) => {
                        if !self.completed.is_fired() {
                            return Err(BundlerError::CompileFailed(summary).into());
                        }
                        output::warning(&format!("Rebuild failed: {summary}"));
                    }
                    Some(BuildEvent::Exited(status)) => {
                        return Err(if self.completed.is_fired() {
                            SupervisorError::WatcherExited(status)
                        } else {
                            SupervisorError::WatcherFailed(status)
                        });
                    }
                    None => {
                        return Err(SupervisorError::WatcherExited("no status".to_string()));
                    }
                },
            }
        }
    }

    #[cfg(test)]
    fn is_complete(&self) -> bool {
        self.completed.is_fired()
    }

    /// Startup stages in fixed order. Returns the build event stream for
    /// watch modes, `None` after a production build.
    async fn start(&self) -> Result<Option<mpsc::Receiver<BuildEvent>>, SupervisorError> {
        self.pre_format().await;

        output::step(&format!("Running in {} mode.", output::highlight(self.mode)));
        let mut config = BundlerConfig::new(&self.settings.bundler, self.mode, self.ports);

        match self.mode {
            Mode::Production => {
                self.bundler.run(&config).await?;
                self.complete();
                Ok(None)
            }
            Mode::Development => {
                let session = self.bundler.watch(&config).await?;
                self.state
                    .set_watcher(Box::new(ChildHandle::new("bundler watcher", session.pid)));
                self.launch_proxy()?;
                Ok(Some(session.events))
            }
            Mode::Server => {
                let port = self.ports.webpack.ok_or(ServerError::NoPort)?;
                config.inject_hot_client(port);
                let session = self.bundler.watch(&config).await?;
                self.state
                    .set_watcher(Box::new(ChildHandle::new("bundler watcher", session.pid)));

                let content_base =
                    crate::paths::resolve(&self.project_dir, &self.settings.server.content_base);
                let server = server::listen(
                    &content_base,
                    &self.settings.app.index,
                    &self.settings.server.host,
                    port,
                )
                .await?;
                tracing::debug!(addr = %server.addr, "dev server bound");
                self.state.set_server(Box::new(ServerHandle::new(server.shutdown)));
                self.launch_proxy()?;
                self.complete();
                Ok(Some(session.events))
            }
        }
    }

    async fn pre_format(&self) {
        let formatter = Formatter::new(&self.project_dir, self.settings.formatter.clone());
        if !formatter.is_enabled() {
            return;
        }
        let selection = if GitCli::new(&self.project_dir).is_repo() {
            Selection::Changed { staged: false }
        } else {
            Selection::All
        };
        let result = match formatter.files(selection) {
            Ok(files) => formatter.format(&files).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(count) => tracing::debug!(count, "pre-format pass done"),
            Err(e) => output::warning(&format!("Formatting pass skipped: {e}")),
        }
    }

    fn launch_proxy(&self) -> Result<(), SupervisorError> {
        let launched = proxy::launch(&self.settings, &self.project_dir, self.mode, &self.ports)?;
        if let Some(pid) = launched {
            self.state
                .set_proxy(Box::new(ChildHandle::new("live-reload proxy", Some(pid))));
        }
        Ok(())
    }

    /// Completion step; runs at most once per supervisor.
    fn complete(&self) {
        if !self.completed.fire() {
            return;
        }
        match self.mode {
            Mode::Production => output::success("Production build complete."),
            Mode::Development => output::success("Initial build complete. Watching for changes."),
            Mode::Server => output::success(&format!(
                "Dev server running on port {}.",
                output::highlight(self.ports.webpack.unwrap_or_default())
            )),
        }
    }
}

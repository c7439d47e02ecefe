//! Bundler collaborator: single-shot builds and continuous watch sessions.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tasker_core::{Mode, PortSet};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::output;
use crate::settings::BundlerSettings;

/// Placeholder in collaborator argv replaced by the generated config path.
pub const CONFIG_PLACEHOLDER: &str = "{config}";

#[derive(Debug, Error)]
pub enum BundlerError {
    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("No {0} command configured")]
    EmptyCommand(&'static str),

    #[error("Bundler failed to compile ({0})")]
    CompileFailed(String),

    #[error("Failed to write bundler config {0}: {1}")]
    Config(PathBuf, std::io::Error),

    #[error("Failed to serialize bundler config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Bundler I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration handed to the bundler as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerConfig {
    pub mode: Mode,
    pub entries: BTreeMap<String, Vec<String>>,
    pub watch_ignored: String,
    pub ports: PortSet,
    pub hot: bool,
}

impl BundlerConfig {
    pub fn new(settings: &BundlerSettings, mode: Mode, ports: PortSet) -> Self {
        Self {
            mode,
            entries: settings.entries.clone(),
            watch_ignored: settings.ignored.clone(),
            ports,
            hot: false,
        }
    }

    /// Prepend the dev-server client entries to every bundle.
    pub fn inject_hot_client(&mut self, port: u16) {
        let client = [
            format!("webpack-dev-server/client?http://localhost:{port}/"),
            "webpack/hot/dev-server".to_string(),
        ];
        for modules in self.entries.values_mut() {
            let mut injected = client.to_vec();
            injected.extend(modules.drain(..).filter(|m| !client.contains(m)));
            *modules = injected;
        }
        self.hot = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A (re)build finished
    Built,
    /// A (re)build finished with errors; carries the bundler's summary line
    Failed(String),
    /// The watcher process ended
    Exited(String),
}

pub struct WatchSession {
    pub pid: Option<u32>,
    pub events: mpsc::Receiver<BuildEvent>,
}

#[async_trait]
pub trait Bundler: Send + Sync {
    /// Build once and wait for completion.
    async fn run(&self, config: &BundlerConfig) -> Result<(), BundlerError>;

    /// Start a continuous watch session.
    async fn watch(&self, config: &BundlerConfig) -> Result<WatchSession, BundlerError>;
}

/// Bundler driven through an external command.
pub struct CommandBundler {
    project_dir: PathBuf,
    settings: BundlerSettings,
}

impl CommandBundler {
    pub fn new(project_dir: impl Into<PathBuf>, settings: BundlerSettings) -> Self {
        Self {
            project_dir: project_dir.into(),
            settings,
        }
    }

    fn write_config(&self, config: &BundlerConfig) -> Result<PathBuf, BundlerError> {
        let path = crate::paths::resolve(&self.project_dir, &self.settings.config_out);
        write_json(&path, config)?;
        Ok(path)
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn run(&self, config: &BundlerConfig) -> Result<(), BundlerError> {
        let config_path = self.write_config(config)?;
        let argv = expand_command(&self.settings.build, &config_path);
        let mut child = collaborator(&argv, &self.project_dir, config.mode, "bundler")?
            .spawn()
            .map_err(|e| spawn_error(&argv, e))?;
        let reader = forward_output(&mut child, "bundler", None);

        let status = child.wait().await?;
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        if !status.success() {
            return Err(BundlerError::CompileFailed(status.to_string()));
        }
        Ok(())
    }

    async fn watch(&self, config: &BundlerConfig) -> Result<WatchSession, BundlerError> {
        let config_path = self.write_config(config)?;
        let argv = expand_command(&self.settings.watch, &config_path);
        let mut child = collaborator(&argv, &self.project_dir, config.mode, "bundler")?
            .spawn()
            .map_err(|e| spawn_error(&argv, e))?;
        let pid = child.id();
        tracing::debug!(?pid, "bundler watcher started");

        let (tx, rx) = mpsc::channel(16);
        let markers = BuildMarkers::from_settings(&self.settings);
        if markers.is_none() {
            let _ = tx.send(BuildEvent::Built).await;
        }
        let reader = forward_output(&mut child, "bundler", markers.map(|m| (m, tx.clone())));

        tokio::spawn(async move {
            // Drain stdout first so every Built precedes Exited.
            if let Some(reader) = reader {
                let _ = reader.await;
            }
            let status = match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };
            let _ = tx.send(BuildEvent::Exited(status)).await;
        });

        Ok(WatchSession { pid, events: rx })
    }
}

/// Stdout markers of a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BuildMarkers {
    ready: String,
    error: Option<String>,
}

impl BuildMarkers {
    /// `None` when no ready marker is configured.
    fn from_settings(settings: &BundlerSettings) -> Option<Self> {
        let ready = settings.ready_marker.clone().filter(|m| !m.is_empty())?;
        Some(Self {
            ready,
            error: settings.error_marker.clone().filter(|m| !m.is_empty()),
        })
    }

    fn classify(&self, line: &str) -> Option<BuildEvent> {
        if !line.contains(self.ready.as_str()) {
            return None;
        }
        match &self.error {
            Some(error) if line.contains(error.as_str()) => {
                Some(BuildEvent::Failed(line.trim().to_string()))
            }
            _ => Some(BuildEvent::Built),
        }
    }
}

/// Replace the config placeholder in every argument.
pub fn expand_command(argv: &[String], config_path: &Path) -> Vec<String> {
    let config = config_path.to_string_lossy();
    argv.iter()
        .map(|arg| arg.replace(CONFIG_PLACEHOLDER, &config))
        .collect()
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BundlerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| BundlerError::Config(path.to_path_buf(), e))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|e| BundlerError::Config(path.to_path_buf(), e))
}

/// Command for a collaborator process running in `mode`.
pub(crate) fn collaborator(
    argv: &[String],
    project_dir: &Path,
    mode: Mode,
    what: &'static str,
) -> Result<Command, BundlerError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(BundlerError::EmptyCommand(what));
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(project_dir)
        .env("NODE_ENV", mode.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(command)
}

pub(crate) fn spawn_error(argv: &[String], e: std::io::Error) -> BundlerError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BundlerError::CommandNotFound(argv.first().cloned().unwrap_or_default())
    } else {
        BundlerError::Io(e)
    }
}

/// Pass child output through to the terminal. When `markers` is set, every
/// stdout ready line emits `Built`, or `Failed` if it also carries the error
/// marker. Returns the stdout reader task.
pub(crate) fn forward_output(
    child: &mut tokio::process::Child,
    source: &'static str,
    markers: Option<(BuildMarkers, mpsc::Sender<BuildEvent>)>,
) -> Option<JoinHandle<()>> {
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move { read_lines(stderr, source, None).await });
    }
    child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(async move { read_lines(stdout, source, markers).await }))
}

async fn read_lines<R: AsyncRead + Unpin>(
    reader: R,
    source: &'static str,
    markers: Option<(BuildMarkers, mpsc::Sender<BuildEvent>)>,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        output::passthrough(source, &line);
        if let Some((markers, tx)) = &markers
            && let Some(event) = markers.classify(&line)
        {
            let _ = tx.send(event).await;
        }
    }
}

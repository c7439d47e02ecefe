//! Live-reload proxy collaborator.

use serde::Serialize;
use std::path::Path;
use tasker_core::{Mode, PortSet};

use super::bundler::{self, BundlerError};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOptions {
    pub host: String,
    pub proxy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiOptions>,
    pub reload: bool,
    pub notify: bool,
    pub open: bool,
    pub name: String,
    pub auto_close_tabs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiOptions {
    pub port: u16,
}

impl ProxyOptions {
    /// Ports that were never resolved are left out so the proxy picks its own.
    pub fn new(settings: &Settings, mode: Mode, ports: &PortSet) -> Self {
        let proxy = match (mode, ports.webpack) {
            (Mode::Server, Some(port)) => format!("localhost:{port}"),
            _ => settings
                .app
                .url(&format!("dist/{}", settings.app.index), None),
        };
        Self {
            host: "localhost".to_string(),
            proxy,
            port: ports.local,
            ui: ports.ui.map(|port| UiOptions { port }),
            // The dev server owns reloads in server mode.
            reload: mode != Mode::Server,
            notify: false,
            open: settings.proxy.open,
            name: settings.proxy.name.clone(),
            auto_close_tabs: settings.proxy.auto_close_tabs,
        }
    }
}

/// Start the proxy for a watch run. Returns the child pid, or `None` when the
/// proxy is disabled or not wanted for `mode`.
pub fn launch(
    settings: &Settings,
    project_dir: &Path,
    mode: Mode,
    ports: &PortSet,
) -> Result<Option<u32>, BundlerError> {
    if mode == Mode::Production || settings.proxy.command.is_empty() {
        tracing::debug!(mode = %mode, "live-reload proxy not started");
        return Ok(None);
    }

    let options = ProxyOptions::new(settings, mode, ports);
    let config_path = crate::paths::resolve(project_dir, &settings.proxy.config_out);
    bundler::write_json(&config_path, &options)?;

    let argv = bundler::expand_command(&settings.proxy.command, &config_path);
    let mut child = bundler::collaborator(&argv, project_dir, mode, "proxy")?
        .spawn()
        .map_err(|e| bundler::spawn_error(&argv, e))?;
    let pid = child.id();
    bundler::forward_output(&mut child, "proxy", None);
    tracing::info!(?pid, port = ?options.port, "live-reload proxy started");

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if !status.success() => {
                tracing::warn!("live-reload proxy exited with {}", status)
            }
            Ok(_) => tracing::debug!("live-reload proxy exited"),
            Err(e) => tracing::warn!("failed to wait for live-reload proxy: {}", e),
        }
    });
    Ok(pid)
}

//! Project settings loaded from `tasker.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{} is missing (settings file).", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Port slots every run fills: proxy, proxy UI and bundler dev server.
const PORT_SLOTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Indent used when pretty-printing the internal registry file
    pub indent: String,
    pub paths: PathSettings,
    pub ports: PortSettings,
    pub app: AppSettings,
    pub bundler: BundlerSettings,
    pub proxy: ProxySettings,
    pub server: ServerSettings,
    pub formatter: FormatterSettings,
    pub editor: EditorSettings,
    pub stats: StatsSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Internal registry document
    pub internal: String,
    /// Generated Markdown previews, wiped when the owning instance exits
    pub markdown_preview: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            internal: ".tasker/internal.json".to_string(),
            markdown_preview: "markdown/previews".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub start: u16,
    pub end: u16,
    pub ip: String,
    pub count: usize,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            start: 3000,
            end: 3100,
            ip: "127.0.0.1".to_string(),
            count: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Host plus optional base path the project is reachable under
    pub dir: String,
    pub index: String,
    pub https: bool,
    /// Browser program; the platform opener is used when unset
    pub browser: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            dir: "localhost".to_string(),
            index: "index.html".to_string(),
            https: false,
            browser: None,
        }
    }
}

impl AppSettings {
    /// URL of `path` under the app directory. `dir` may carry a base path
    /// after the host (`localhost/site`).
    pub fn url(&self, path: &str, port: Option<u16>) -> String {
        let scheme = if self.https { "https" } else { "http" };
        let dir = self.dir.trim_matches('/');
        let (host, base) = dir.split_once('/').unwrap_or((dir, ""));
        let mut url = format!("{scheme}://{host}");
        if let Some(port) = port {
            url.push_str(&format!(":{port}"));
        }
        for part in [base, path.trim_start_matches("./").trim_start_matches('/')] {
            let part = part.trim_matches('/');
            if !part.is_empty() {
                url.push('/');
                url.push_str(part);
            }
        }
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerSettings {
    /// Single-shot build command. `{config}` expands to the generated config path.
    pub build: Vec<String>,
    /// Continuous watch command
    pub watch: Vec<String>,
    /// Output line that marks a finished (re)build of the watch command
    pub ready_marker: Option<String>,
    /// Text that turns a ready line into a failed build (`compiled with 1 error`)
    pub error_marker: Option<String>,
    /// Pattern the watcher ignores
    pub ignored: String,
    pub entries: BTreeMap<String, Vec<String>>,
    /// Where the generated bundler config is written
    pub config_out: String,
}

impl Default for BundlerSettings {
    fn default() -> Self {
        Self {
            build: vec![
                "npx".to_string(),
                "webpack".to_string(),
                "--env".to_string(),
                "tasker={config}".to_string(),
            ],
            watch: vec![
                "npx".to_string(),
                "webpack".to_string(),
                "--watch".to_string(),
                "--env".to_string(),
                "tasker={config}".to_string(),
            ],
            ready_marker: Some("compiled".to_string()),
            error_marker: Some("error".to_string()),
            ignored: "node_modules".to_string(),
            entries: BTreeMap::from([(
                "app".to_string(),
                vec!["./src/js/app.js".to_string()],
            )]),
            config_out: ".tasker/bundler.config.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Live-reload proxy command; empty disables the proxy.
    pub command: Vec<String>,
    pub name: String,
    pub open: bool,
    pub auto_close_tabs: bool,
    pub config_out: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            command: vec![
                "npx".to_string(),
                "browser-sync".to_string(),
                "start".to_string(),
                "--config".to_string(),
                "{config}".to_string(),
            ],
            name: "BS".to_string(),
            open: true,
            auto_close_tabs: false,
            config_out: ".tasker/proxy.config.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// Directory served by the dev server in server mode
    pub content_base: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            content_base: "src/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterSettings {
    /// Formatter command; file paths are appended. Empty skips formatting.
    pub command: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for FormatterSettings {
    fn default() -> Self {
        Self {
            command: vec![
                "npx".to_string(),
                "prettier".to_string(),
                "--write".to_string(),
            ],
            extensions: ["html", "css", "scss", "js", "jsx", "ts", "tsx", "json", "md"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Use `command`/`flags` before falling back to $EDITOR/$VISUAL
    pub active: bool,
    pub command: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub web: Vec<String>,
    pub code: Vec<String>,
}

impl Default for StatsSettings {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            web: list(&[
                "html", "htm", "css", "scss", "sass", "less", "js", "jsx", "ts", "tsx", "json",
                "svg", "md",
            ]),
            code: list(&[
                "html", "htm", "css", "scss", "sass", "less", "js", "mjs", "cjs", "jsx", "ts",
                "tsx", "json", "md", "php", "py", "rb", "rs", "go", "java", "c", "h", "cpp",
                "sh", "yml", "yaml", "toml", "xml", "vue", "svelte",
            ]),
        }
    }
}

impl Settings {
    /// Settings written by `tasker settings --rebuild`.
    pub fn template() -> Self {
        Self {
            indent: tasker_core::DEFAULT_INDENT.to_string(),
            ..Default::default()
        }
    }

    pub fn load_from_dir<P: AsRef<Path>>(project_dir: P) -> Result<Self> {
        let path = paths::settings_path(project_dir.as_ref());
        if !path.is_file() {
            return Err(SettingsError::Missing(path));
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| SettingsError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut parsed: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            toml::from_str(content)?
        };
        if parsed.indent.is_empty() {
            parsed.indent = tasker_core::DEFAULT_INDENT.to_string();
        }
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.start > self.ports.end {
            return Err(SettingsError::Validation(format!(
                "ports.start ({}) must not be greater than ports.end ({})",
                self.ports.start, self.ports.end
            )));
        }
        if self.ports.count < PORT_SLOTS {
            return Err(SettingsError::Validation(format!(
                "ports.count ({}) must be at least {PORT_SLOTS} (local, ui and bundler)",
                self.ports.count
            )));
        }
        if self.ports.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(SettingsError::Validation(format!(
                "ports.ip '{}' is not an IP address",
                self.ports.ip
            )));
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| SettingsError::FileWrite(parent.to_path_buf(), e))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| SettingsError::FileWrite(path.to_path_buf(), e))?;
        Ok(())
    }
}

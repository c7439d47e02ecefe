pub mod open;
pub mod ports;
pub mod pretty;
pub mod settings;
pub mod start;
pub mod stats;
pub mod status;
pub mod stop;

use std::path::PathBuf;

use tasker_core::{Registry, RegistryError};

use crate::paths;
use crate::settings::{Settings, SettingsError};

/// Project directory plus its loaded settings; shared by every task that
/// needs `tasker.toml`.
pub struct Context {
    pub project_dir: PathBuf,
    pub settings: Settings,
}

impl Context {
    pub fn load() -> Result<Self, SettingsError> {
        let project_dir =
            paths::project_dir().map_err(|e| SettingsError::FileRead(PathBuf::from("."), e))?;
        let settings = Settings::load_from_dir(&project_dir)?;
        Ok(Self {
            project_dir,
            settings,
        })
    }

    pub fn registry_path(&self) -> PathBuf {
        paths::resolve(&self.project_dir, &self.settings.paths.internal)
    }

    pub fn preview_dir(&self) -> PathBuf {
        paths::resolve(&self.project_dir, &self.settings.paths.markdown_preview)
    }

    /// Fresh copy of the registry document.
    pub fn read_registry(&self) -> Result<Registry, RegistryError> {
        Ok(Registry::read(self.registry_path())?.with_indent(self.settings.indent.clone()))
    }
}

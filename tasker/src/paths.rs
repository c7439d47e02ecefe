use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Name of the project settings file that marks a project root.
pub const SETTINGS_FILE: &str = "tasker.toml";

/// Get the project directory tasks operate on.
///
/// - `TASKER_PROJECT_DIR` wins when set.
/// - Otherwise walk up from the working directory to the nearest `tasker.toml`.
/// - Fall back to the working directory itself.
pub fn project_dir() -> Result<PathBuf, std::io::Error> {
    if let Ok(v) = std::env::var("TASKER_PROJECT_DIR")
        && !v.trim().is_empty()
    {
        return Ok(PathBuf::from(v));
    }

    let cwd = std::env::current_dir()?;
    Ok(find_project_root(&cwd).unwrap_or(cwd))
}

/// Walk up from `start` and return the first directory containing `tasker.toml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut cur = start;
    loop {
        if cur.join(SETTINGS_FILE).is_file() {
            return Some(cur.to_path_buf());
        }
        cur = cur.parent()?;
    }
}

pub fn settings_path(project_dir: &Path) -> PathBuf {
    project_dir.join(SETTINGS_FILE)
}

/// Resolve a settings-relative path against the project directory.
/// Absolute paths are returned unchanged.
pub fn resolve(project_dir: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

/// Name the running binary reports in the OS process table.
pub fn binary_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

#[cfg(test)]
pub(crate) fn test_project_env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

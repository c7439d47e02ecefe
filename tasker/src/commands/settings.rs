use std::path::Path;

use crate::output;
use crate::paths;
use crate::settings::Settings;

/// Write the default `tasker.toml` into `project_dir`. An existing file is
/// only replaced with `force`.
pub fn rebuild(project_dir: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = paths::settings_path(project_dir);
    if path.exists() && !force {
        output::warning(&format!(
            "{} already exists. Use --force to overwrite it.",
            output::highlight(path.display())
        ));
        return Ok(());
    }
    Settings::template().save_to_file(&path)?;
    output::success(&format!("Rebuilt {}.", output::highlight(path.display())));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rebuild_writes_template_and_respects_existing_file() {
        let temp = TempDir::new().unwrap();
        rebuild(temp.path(), false).unwrap();
        let path = temp.path().join("tasker.toml");
        assert_eq!(Settings::load_from_file(&path).unwrap(), Settings::template());

        std::fs::write(&path, "indent = \"  \"\n").unwrap();
        rebuild(temp.path(), false).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"  \""));

        rebuild(temp.path(), true).unwrap();
        assert_eq!(Settings::load_from_file(&path).unwrap(), Settings::template());
    }
}

//! External formatter collaborator ("pretty").

use std::path::{Path, PathBuf};
use std::process::Stdio;

use ignore::WalkBuilder;
use thiserror::Error;
use tokio::process::Command;

use crate::git::{GitCli, GitError};
use crate::settings::FormatterSettings;

/// Files passed to one formatter invocation.
const CHUNK: usize = 50;

#[derive(Debug, Error)]
pub enum FormatterError {
    #[error("Formatter command '{0}' not found")]
    CommandNotFound(String),

    #[error("Formatter exited with {0}")]
    Failed(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("Failed to walk project files: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Formatter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every non-ignored project file
    All,
    /// Files git reports as modified or untracked
    Changed { staged: bool },
}

pub struct Formatter {
    project_dir: PathBuf,
    settings: FormatterSettings,
}

impl Formatter {
    pub fn new(project_dir: impl Into<PathBuf>, settings: FormatterSettings) -> Self {
        Self {
            project_dir: project_dir.into(),
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.settings.command.is_empty()
    }

    /// Formattable files for `selection`, as absolute paths.
    pub fn files(&self, selection: Selection) -> Result<Vec<PathBuf>, FormatterError> {
        let candidates = match selection {
            Selection::All => {
                let mut files = Vec::new();
                for entry in WalkBuilder::new(&self.project_dir).build() {
                    let entry = entry?;
                    if entry.file_type().is_some_and(|t| t.is_file()) {
                        files.push(entry.into_path());
                    }
                }
                files
            }
            Selection::Changed { staged } => {
                let git = GitCli::new(&self.project_dir);
                let root = git.toplevel()?;
                git.changed_files(staged)?
                    .into_iter()
                    .map(|path| root.join(path))
                    .filter(|path| path.is_file())
                    .collect()
            }
        };
        let mut files: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|path| self.accepts(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.settings
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    /// Format `files` in place. Returns how many files were handed over.
    pub async fn format(&self, files: &[PathBuf]) -> Result<usize, FormatterError> {
        let Some((program, args)) = self.settings.command.split_first() else {
            return Ok(0);
        };
        for chunk in files.chunks(CHUNK) {
            let status = Command::new(program)
                .args(args)
                .args(chunk)
                .current_dir(&self.project_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        FormatterError::CommandNotFound(program.clone())
                    } else {
                        FormatterError::Io(e)
                    }
                })?;
            if !status.success() {
                return Err(FormatterError::Failed(status.to_string()));
            }
        }
        tracing::debug!(count = files.len(), "formatted files");
        Ok(files.len())
    }
}

//! Version-control state reader backed by the `git` executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Source of the currently checked-out branch.
pub trait BranchSource: Send + Sync {
    /// Whether the working tree is under version control at all.
    fn is_repo(&self) -> bool;

    fn current_branch(&self) -> Result<String, GitError>;

    /// File whose changes indicate a branch switch.
    fn head_path(&self) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
}

impl GitCli {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn git(&self, args: &[&str]) -> Result<Output, GitError> {
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()?)
    }

    fn git_stdout(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.git(args)?;
        if !output.status.success() {
            return Err(GitError::Failed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Files changed relative to HEAD plus untracked files, relative to the
    /// repository root. With `staged`, only the index is compared.
    pub fn changed_files(&self, staged: bool) -> Result<Vec<PathBuf>, GitError> {
        let mut diff = vec!["diff", "--name-only", "--diff-filter=ACMRTUB"];
        if staged {
            diff.push("--cached");
        }
        let mut files: Vec<PathBuf> = lines(&self.git_stdout(&diff)?);
        if !staged {
            for path in lines(&self.git_stdout(&["ls-files", "--others", "--exclude-standard"])?) {
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    pub fn toplevel(&self) -> Result<PathBuf, GitError> {
        self.git_stdout(&["rev-parse", "--show-toplevel"])
            .map(PathBuf::from)
    }
}

fn lines(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl BranchSource for GitCli {
    fn is_repo(&self) -> bool {
        // A missing git binary means there is nothing to watch.
        self.git(&["rev-parse", "--git-dir"])
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn current_branch(&self) -> Result<String, GitError> {
        match self.git_stdout(&["symbolic-ref", "--short", "HEAD"]) {
            Ok(branch) => Ok(branch),
            // Detached HEAD
            Err(_) => self.git_stdout(&["rev-parse", "--short", "HEAD"]),
        }
    }

    fn head_path(&self) -> Option<PathBuf> {
        let raw = self.git_stdout(&["rev-parse", "--git-path", "HEAD"]).ok()?;
        let path = Path::new(&raw);
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn init_repo(dir: &Path, branch: &str) {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .output()
                .unwrap()
                .status;
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q"]);
        run(&["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")]);
    }

    #[test]
    fn plain_directory_is_not_a_repo() {
        let temp = TempDir::new().unwrap();
        let git = GitCli::new(temp.path());
        if git.git(&["rev-parse", "--show-toplevel"]).is_ok_and(|o| o.status.success()) {
            // Temp dir lives inside some outer checkout; nothing to assert.
            return;
        }
        assert!(!git.is_repo());
    }

    #[test]
    fn reads_branch_of_fresh_repo() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        init_repo(temp.path(), "main");

        let git = GitCli::new(temp.path());
        assert!(git.is_repo());
        assert_eq!(git.current_branch().unwrap(), "main");
        let head = git.head_path().unwrap();
        assert!(head.ends_with(".git/HEAD"));
        assert!(head.is_file());
    }

    #[test]
    fn untracked_files_count_as_changed() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        init_repo(temp.path(), "main");
        std::fs::write(temp.path().join("app.js"), "let a=1").unwrap();

        let git = GitCli::new(temp.path());
        assert_eq!(git.changed_files(false).unwrap(), vec![PathBuf::from("app.js")]);
        assert!(git.changed_files(true).unwrap().is_empty());
    }
}

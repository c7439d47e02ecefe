//! Branch watchdog.
//!
//! Watches the VCS HEAD file while a supervisor runs. When the checked-out
//! branch changes, the run is stopped so the operator restarts it against
//! the new file set.

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::git::{BranchSource, GitError};
use crate::output;
use crate::supervisor::state::RunState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSwitch {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchCheck {
    Unchanged,
    Switched(BranchSwitch),
}

/// Handle that keeps the HEAD watcher alive
pub struct WatchdogHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _thread: std::thread::JoinHandle<()>,
}

#[derive(Clone)]
pub struct BranchWatchdog {
    source: Arc<dyn BranchSource>,
    state: Arc<RunState>,
}

impl BranchWatchdog {
    pub fn new(source: Arc<dyn BranchSource>, state: Arc<RunState>) -> Self {
        Self { source, state }
    }

    /// Capture the current branch and start watching HEAD.
    ///
    /// Returns `Ok(None)` when the project is not under version control.
    pub fn start(
        &self,
        switch_tx: mpsc::Sender<BranchSwitch>,
    ) -> Result<Option<WatchdogHandle>, Box<dyn std::error::Error>> {
        if !self.source.is_repo() {
            tracing::debug!("not a git repository; branch watchdog disabled");
            return Ok(None);
        }
        let Some(head) = self.source.head_path() else {
            tracing::debug!("HEAD file not found; branch watchdog disabled");
            return Ok(None);
        };
        let Some(dir) = head.parent().map(|p| p.to_path_buf()) else {
            return Ok(None);
        };

        let branch = self.source.current_branch()?;
        tracing::debug!(branch = %branch, head = %head.display(), "watching branch");
        self.state.set_branch(Some(branch));

        let (tx, rx) = std_mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_millis(150), tx)?;
        // git replaces HEAD by renaming a lock file, so watch the directory.
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)?;

        let watchdog = self.clone();
        let head_name = head.file_name().map(|n| n.to_os_string());
        let handle = std::thread::spawn(move || {
            for result in rx {
                let events = match result {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("HEAD watch error: {:?}", e);
                        continue;
                    }
                };
                if !events
                    .iter()
                    .any(|event| event.path.file_name() == head_name.as_deref())
                {
                    continue;
                }
                match watchdog.check() {
                    Ok(BranchCheck::Unchanged) => {}
                    Ok(BranchCheck::Switched(switch)) => {
                        report_switch(&switch);
                        let _ = switch_tx.blocking_send(switch);
                        return;
                    }
                    Err(e) => tracing::warn!("failed to read current branch: {}", e),
                }
            }
        });

        Ok(Some(WatchdogHandle {
            _debouncer: debouncer,
            _thread: handle,
        }))
    }

    /// Compare the live branch with the captured one.
    pub fn check(&self) -> Result<BranchCheck, GitError> {
        let Some(captured) = self.state.branch() else {
            return Ok(BranchCheck::Unchanged);
        };
        let live = self.source.current_branch()?;
        if live == captured {
            Ok(BranchCheck::Unchanged)
        } else {
            Ok(BranchCheck::Switched(BranchSwitch {
                from: captured,
                to: live,
            }))
        }
    }
}

fn report_switch(switch: &BranchSwitch) {
    output::warning(&format!(
        "Tasker stopped due to a branch switch. ({} => {})",
        output::highlight(&switch.from),
        output::highlight(&switch.to)
    ));
    output::muted(&format!(
        "Restart Tasker to monitor {} branch.",
        switch.to
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct FakeBranch {
        repo: bool,
        branch: Mutex<String>,
        head: Option<PathBuf>,
    }

    impl FakeBranch {
        fn new(branch: &str, head: Option<PathBuf>) -> Arc<Self> {
            Arc::new(Self {
                repo: true,
                branch: Mutex::new(branch.to_string()),
                head,
            })
        }

        fn checkout(&self, branch: &str) {
            *self.branch.lock() = branch.to_string();
        }
    }

    impl BranchSource for FakeBranch {
        fn is_repo(&self) -> bool {
            self.repo
        }

        fn current_branch(&self) -> Result<String, GitError> {
            Ok(self.branch.lock().clone())
        }

        fn head_path(&self) -> Option<PathBuf> {
            self.head.clone()
        }
    }

    #[test]
    fn no_repository_is_not_an_error() {
        let source = Arc::new(FakeBranch {
            repo: false,
            branch: Mutex::new(String::new()),
            head: None,
        });
        let state = Arc::new(RunState::new());
        let (tx, _rx) = mpsc::channel(1);
        let handle = BranchWatchdog::new(source, state.clone()).start(tx).unwrap();
        assert!(handle.is_none());
        assert!(state.branch().is_none());
    }

    #[test]
    fn check_reports_switch_from_captured_branch() {
        let source = FakeBranch::new("main", None);
        let state = Arc::new(RunState::new());
        state.set_branch(Some("main".to_string()));
        let watchdog = BranchWatchdog::new(source.clone(), state);

        assert_eq!(watchdog.check().unwrap(), BranchCheck::Unchanged);

        source.checkout("feature-x");
        assert_eq!(
            watchdog.check().unwrap(),
            BranchCheck::Switched(BranchSwitch {
                from: "main".to_string(),
                to: "feature-x".to_string(),
            })
        );
    }

    #[test]
    fn cleared_state_never_reports_a_switch() {
        let source = FakeBranch::new("main", None);
        let state = Arc::new(RunState::new());
        state.set_branch(Some("main".to_string()));
        let watchdog = BranchWatchdog::new(source.clone(), state.clone());

        state.set_branch(None);
        source.checkout("other");
        assert_eq!(watchdog.check().unwrap(), BranchCheck::Unchanged);
    }

    #[tokio::test]
    async fn head_change_event_delivers_switch() {
        let temp = TempDir::new().unwrap();
        let head = temp.path().join("HEAD");
        std::fs::write(&head, "ref: refs/heads/main\n").unwrap();

        let source = FakeBranch::new("main", Some(head.clone()));
        let state = Arc::new(RunState::new());
        let (tx, mut rx) = mpsc::channel(1);
        let _handle = BranchWatchdog::new(source.clone(), state.clone())
            .start(tx)
            .unwrap()
            .expect("watchdog started");
        assert_eq!(state.branch().as_deref(), Some("main"));

        source.checkout("feature-x");
        std::fs::write(&head, "ref: refs/heads/feature-x\n").unwrap();

        let switch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("switch reported in time")
            .expect("channel open");
        assert_eq!(switch.from, "main");
        assert_eq!(switch.to, "feature-x");
    }
}

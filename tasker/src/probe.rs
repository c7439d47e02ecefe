//! Decides whether a recorded pid is still a live Tasker supervisor.
//!
//! A pid only counts as the same instance when the OS reports a process with
//! both the recorded command line and the expected binary name. Start time is
//! not compared, so a reused pid whose process happens to share name and
//! command line is still treated as a match.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tasker_core::ProcessRecord;

/// One entry of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmd: String,
}

pub trait ProcessTable {
    fn lookup(&self, pid: u32) -> Option<ProcessInfo>;
}

/// Process table backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn lookup(&self, pid: u32) -> Option<ProcessInfo> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            false,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );
        let process = sys.process(Pid::from_u32(pid))?;
        let cmd = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        Some(ProcessInfo {
            pid,
            name: process.name().to_string_lossy().into_owned(),
            cmd,
        })
    }
}

/// What the probe concluded about the recorded instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Nothing recorded
    Absent,
    /// A pid is recorded but no process with that id exists
    Stale(u32),
    /// The pid is alive but belongs to something else
    Foreign(ProcessInfo),
    Running(ProcessInfo),
}

impl InstanceStatus {
    pub fn running(&self) -> Option<&ProcessInfo> {
        match self {
            InstanceStatus::Running(info) => Some(info),
            _ => None,
        }
    }
}

pub struct Probe<T: ProcessTable = SystemProcessTable> {
    table: T,
    expected_name: String,
}

impl Probe<SystemProcessTable> {
    pub fn system() -> Self {
        Self::new(SystemProcessTable, crate::paths::binary_name())
    }
}

impl<T: ProcessTable> Probe<T> {
    pub fn new(table: T, expected_name: impl Into<String>) -> Self {
        Self {
            table,
            expected_name: expected_name.into(),
        }
    }

    pub fn status(&self, record: Option<&ProcessRecord>) -> InstanceStatus {
        let Some(pid) = record.and_then(|r| r.pid) else {
            return InstanceStatus::Absent;
        };
        let Some(info) = self.table.lookup(pid) else {
            tracing::debug!(pid, "recorded pid is not alive; treating record as stale");
            return InstanceStatus::Stale(pid);
        };

        let title_matches = record.is_some_and(|r| r.title == info.cmd);
        if title_matches && self.name_matches(&info.name) {
            InstanceStatus::Running(info)
        } else {
            tracing::debug!(pid, name = %info.name, "recorded pid belongs to another process");
            InstanceStatus::Foreign(info)
        }
    }

    /// The live matching instance for `record`, if any.
    pub fn exists(&self, record: &ProcessRecord) -> Option<ProcessInfo> {
        match self.status(Some(record)) {
            InstanceStatus::Running(info) => Some(info),
            _ => None,
        }
    }

    fn name_matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let expected = self.expected_name.to_lowercase();
        // Linux truncates process names to 15 bytes.
        name == expected || (name.len() >= 15 && expected.starts_with(&name))
    }
}

/// Ask `pid` to terminate. Returns false when no such process exists or the
/// signal could not be delivered.
pub fn terminate(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), false);
    let Some(process) = sys.process(Pid::from_u32(pid)) else {
        return false;
    };
    process
        .kill_with(Signal::Term)
        .unwrap_or_else(|| process.kill())
}

/// Command line of the current process, in the form the process table reports it.
pub fn current_title() -> String {
    std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeTable(HashMap<u32, ProcessInfo>);

    impl FakeTable {
        fn with(mut self, pid: u32, name: &str, cmd: &str) -> Self {
            self.0.insert(
                pid,
                ProcessInfo {
                    pid,
                    name: name.to_string(),
                    cmd: cmd.to_string(),
                },
            );
            self
        }
    }

    impl ProcessTable for FakeTable {
        fn lookup(&self, pid: u32) -> Option<ProcessInfo> {
            self.0.get(&pid).cloned()
        }
    }

    fn record(pid: u32, title: &str) -> ProcessRecord {
        ProcessRecord {
            pid: Some(pid),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn no_record_is_absent() {
        let probe = Probe::new(FakeTable::default(), "tasker");
        assert_eq!(probe.status(None), InstanceStatus::Absent);
        assert_eq!(
            probe.status(Some(&ProcessRecord::default())),
            InstanceStatus::Absent
        );
    }

    #[test]
    fn dead_pid_is_stale() {
        let probe = Probe::new(FakeTable::default(), "tasker");
        assert_eq!(
            probe.status(Some(&record(77, "tasker"))),
            InstanceStatus::Stale(77)
        );
        assert!(probe.exists(&record(77, "tasker")).is_none());
    }

    #[test]
    fn matching_title_and_name_is_running() {
        let table = FakeTable::default().with(10, "tasker", "tasker -m s");
        let probe = Probe::new(table, "tasker");
        let info = probe.exists(&record(10, "tasker -m s")).expect("running");
        assert_eq!(info.pid, 10);
    }

    #[test]
    fn reused_pid_with_other_command_is_foreign() {
        let table = FakeTable::default().with(10, "tasker", "tasker status");
        let probe = Probe::new(table, "tasker");
        assert!(matches!(
            probe.status(Some(&record(10, "tasker -m s"))),
            InstanceStatus::Foreign(_)
        ));
    }

    #[test]
    fn reused_pid_with_other_binary_is_foreign() {
        let table = FakeTable::default().with(10, "node", "tasker");
        let probe = Probe::new(table, "tasker");
        assert!(probe.exists(&record(10, "tasker")).is_none());
    }

    #[test]
    fn name_comparison_ignores_case_and_truncation() {
        let table = FakeTable::default()
            .with(1, "Tasker", "x")
            .with(2, "tasker-supervis", "y");
        let probe = Probe::new(table, "tasker");
        assert!(probe.exists(&record(1, "x")).is_some());

        let long = Probe::new(
            FakeTable::default().with(2, "tasker-supervis", "y"),
            "tasker-supervisor",
        );
        assert!(long.exists(&record(2, "y")).is_some());
    }

    #[test]
    fn system_table_finds_current_process() {
        let info = SystemProcessTable
            .lookup(std::process::id())
            .expect("current process is visible");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.name.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_stops_a_child_process() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        assert!(terminate(child.id()));
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}

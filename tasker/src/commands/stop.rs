use super::Context;
use crate::output;
use crate::probe::{self, InstanceStatus, Probe, ProcessTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopResult {
    /// A termination signal was sent to the live instance
    Signalled(u32),
    /// Nothing live was recorded; any stale record has been cleared
    NothingRunning,
}

pub fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let result = stop_with(ctx, &Probe::system(), probe::terminate)?;
    match result {
        StopResult::Signalled(pid) => {
            output::success(&format!("Tasker instance {} stopped.", output::highlight(pid)))
        }
        StopResult::NothingRunning => output::muted("No Tasker process exists."),
    }
    Ok(())
}

/// Signal the recorded instance without waiting for it to exit. The target's
/// own termination handler clears its record.
pub fn stop_with<T: ProcessTable>(
    ctx: &Context,
    probe: &Probe<T>,
    terminate: impl Fn(u32) -> bool,
) -> Result<StopResult, Box<dyn std::error::Error>> {
    let mut registry = ctx.read_registry()?;
    let record = registry.process()?;
    match probe.status(record.as_ref()) {
        InstanceStatus::Running(info) => {
            if terminate(info.pid) {
                tracing::info!(pid = info.pid, "termination signal sent");
                return Ok(StopResult::Signalled(info.pid));
            }
            tracing::debug!(pid = info.pid, "instance vanished before it could be signalled");
        }
        InstanceStatus::Absent => return Ok(StopResult::NothingRunning),
        InstanceStatus::Stale(_) | InstanceStatus::Foreign(_) => {}
    }

    registry.set_process(None)?;
    registry.write()?;
    Ok(StopResult::NothingRunning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{context, seed};
    use crate::probe::ProcessInfo;
    use std::cell::Cell;
    use tasker_core::ProcessRecord;
    use tempfile::TempDir;

    struct OneProcess(ProcessInfo);

    impl ProcessTable for OneProcess {
        fn lookup(&self, pid: u32) -> Option<ProcessInfo> {
            (pid == self.0.pid).then(|| self.0.clone())
        }
    }

    fn record(pid: u32) -> ProcessRecord {
        ProcessRecord {
            pid: Some(pid),
            title: "tasker -m d".to_string(),
            ..ProcessRecord::default()
        }
    }

    fn live(pid: u32) -> Probe<OneProcess> {
        Probe::new(
            OneProcess(ProcessInfo {
                pid,
                name: "tasker".to_string(),
                cmd: "tasker -m d".to_string(),
            }),
            "tasker",
        )
    }

    #[test]
    fn live_instance_is_signalled() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        seed(&ctx, &record(500));
        let signalled = Cell::new(None);

        let result = stop_with(&ctx, &live(500), |pid| {
            signalled.set(Some(pid));
            true
        })
        .unwrap();

        assert_eq!(result, StopResult::Signalled(500));
        assert_eq!(signalled.get(), Some(500));
    }

    #[test]
    fn stale_record_is_cleared_and_reported_as_nothing_running() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        seed(&ctx, &record(500));

        let result = stop_with(&ctx, &live(501), |_| panic!("nothing to signal")).unwrap();
        assert_eq!(result, StopResult::NothingRunning);
        assert!(ctx.read_registry().unwrap().process().unwrap().is_none());

        let again = stop_with(&ctx, &live(501), |_| panic!("nothing to signal")).unwrap();
        assert_eq!(again, StopResult::NothingRunning);
    }
}

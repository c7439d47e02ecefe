use super::Context;
use crate::output;
use crate::probe::{Probe, ProcessTable};

pub fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match running_pid(ctx, &Probe::system())? {
        Some(pid) => output::success(&format!(
            "Tasker instance running. Process {}.",
            output::highlight(pid)
        )),
        None => output::muted("Tasker is not running."),
    }
    Ok(())
}

/// Pid of the live recorded instance. Stale records count as absent.
pub fn running_pid<T: ProcessTable>(
    ctx: &Context,
    probe: &Probe<T>,
) -> Result<Option<u32>, Box<dyn std::error::Error>> {
    let record = ctx.read_registry()?.process()?;
    Ok(record
        .as_ref()
        .and_then(|record| probe.exists(record))
        .map(|info| info.pid))
}

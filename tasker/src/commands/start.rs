//! Default task: start the single supervisor instance.

use std::sync::Arc;

use tasker_core::{Mode, ProcessRecord};
use tokio::sync::mpsc;

use super::Context;
use crate::git::GitCli;
use crate::output;
use crate::ports::{self, PortOverrides};
use crate::probe::{self, Probe};
use crate::supervisor::bundler::CommandBundler;
use crate::supervisor::state::RunState;
use crate::supervisor::{Outcome, Supervisor};
use crate::termination::{ExitTrigger, TerminationHandler};
use crate::watchdog::BranchWatchdog;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub ports: Option<String>,
    pub mode: String,
}

pub async fn run(
    ctx: &Context,
    options: &StartOptions,
    state: Arc<RunState>,
    handler: Arc<TerminationHandler>,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = ctx.read_registry()?.process()?;
    if let Some(existing) = Probe::system().status(record.as_ref()).running() {
        output::warning(&format!(
            "Tasker process {} is running. Stop it before starting a new one.",
            output::highlight(existing.pid)
        ));
        output::muted(&format!(
            "Stop current instance by running: $ {} --stop",
            crate::paths::binary_name()
        ));
        return Ok(());
    }

    let mode = Mode::from_flag(&options.mode);
    let overrides = options
        .ports
        .as_deref()
        .map(PortOverrides::parse)
        .unwrap_or_default();
    let ports = ports::allocate(&ctx.settings.ports, &overrides).await?;

    let record = ProcessRecord {
        pid: Some(std::process::id()),
        title: probe::current_title(),
        argv: std::env::args().collect(),
        mode,
        ports,
    };
    let mut registry = ctx.read_registry()?;
    registry.set_process(Some(&record))?;
    registry.write()?;
    tracing::info!(pid = std::process::id(), mode = %mode, ?ports, "instance registered");

    install_signal_handlers(handler);

    let (switch_tx, switch_rx) = mpsc::channel(1);
    let watchdog = BranchWatchdog::new(Arc::new(GitCli::new(&ctx.project_dir)), state.clone());
    let _watch = watchdog.start(switch_tx)?;

    let supervisor = Supervisor::new(
        ctx.settings.clone(),
        ctx.project_dir.clone(),
        mode,
        ports,
        CommandBundler::new(&ctx.project_dir, ctx.settings.bundler.clone()),
        state,
    );
    match supervisor.run(switch_rx).await? {
        Outcome::Built => {}
        Outcome::BranchSwitched(switch) => {
            tracing::info!(from = %switch.from, to = %switch.to, "stopped after branch switch");
        }
    }
    Ok(())
}

/// Route termination signals through the termination handler.
fn install_signal_handlers(handler: Arc<TerminationHandler>) {
    {
        let handler = handler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal(&handler, 2);
            }
        });
    }
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        for (kind, number) in [
            (SignalKind::terminate(), libc::SIGTERM),
            (SignalKind::hangup(), libc::SIGHUP),
        ] {
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Ok(mut stream) = signal(kind) {
                    let _ = stream.recv().await;
                    on_signal(&handler, number);
                }
            });
        }
    }
}

fn on_signal(handler: &TerminationHandler, number: i32) {
    handler.fire(ExitTrigger::Signal(number));
    // Reached when the re-delivered signal did not end the process.
    std::process::exit(128 + number);
}

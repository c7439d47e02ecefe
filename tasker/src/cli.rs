use std::sync::Arc;
use std::thread::ThreadId;

use clap::{Parser, Subcommand};

use crate::commands::{self, Context, open, pretty, start, stats};
use crate::output;
use crate::paths;
use crate::settings::SettingsError;
use crate::supervisor::state::RunState;
use crate::termination::{ExitTrigger, TerminationHandler, TerminationOutcome};

/// Tasker - single-instance front-end task runner and dev-server supervisor
#[derive(Parser)]
#[command(name = "tasker")]
#[command(version)]
#[command(about = "Tasker - single-instance front-end task runner and dev-server supervisor")]
pub struct Cli {
    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Stop the running instance
    #[arg(short = 's', long)]
    pub stop: bool,

    /// Ports to use, as `local:ui` (either side may be omitted)
    #[arg(short = 'p', long, value_name = "LOCAL:UI")]
    pub ports: Option<String>,

    /// Run mode: d (development), p (production) or s (server)
    #[arg(short = 'm', long, default_value = "d")]
    pub mode: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether an instance is running
    Status,

    /// Show the ports held by the running instance
    Ports,

    /// Open a file in the browser or editor, or a directory in the file manager
    Open {
        /// File to open in the browser
        #[arg(short = 'F', long)]
        file: Option<String>,

        /// Port to open the file on (defaults to the instance's local port)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Directory to open in the file manager
        #[arg(short = 'd', long)]
        directory: Option<String>,

        /// File to open in the text editor
        #[arg(short = 'e', long)]
        editor: Option<String>,

        /// Wait for the editor to close
        #[arg(short = 'w', long, requires = "editor")]
        wait: bool,

        /// Line to open the file at
        #[arg(short = 'l', long, requires = "editor")]
        line: Option<u32>,

        /// Column to open the file at
        #[arg(short = 'c', long, requires = "editor")]
        column: Option<u32>,

        /// Editor to use instead of $EDITOR/$VISUAL
        #[arg(short = 'u', long = "use", requires = "editor")]
        use_editor: Option<String>,
    },

    /// Print file-extension statistics for the project
    Stats {
        /// Only count web files
        #[arg(short = 'w', long)]
        web: bool,

        /// Count every known code file type
        #[arg(short = 'c', long)]
        comprehensive: bool,

        /// List every counted file
        #[arg(short = 'l', long)]
        list: bool,
    },

    /// Run the formatter over project files
    Pretty {
        /// Only format files git reports as changed
        #[arg(short = 'q', long)]
        quick: bool,

        /// Only format staged files
        #[arg(long)]
        staged: bool,
    },

    /// Manage the tasker.toml settings file
    Settings {
        /// Write a default tasker.toml
        #[arg(long)]
        rebuild: bool,

        /// Overwrite an existing tasker.toml
        #[arg(long, requires = "rebuild")]
        force: bool,
    },
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(Commands::Settings { rebuild, force }) = &self.command {
            if !*rebuild {
                output::muted(&format!(
                    "Nothing to do. Rebuild the settings file with: $ {} settings --rebuild",
                    paths::binary_name()
                ));
                return Ok(());
            }
            return commands::settings::rebuild(&paths::project_dir()?, *force);
        }

        let ctx = match Context::load() {
            Ok(ctx) => ctx,
            Err(e @ SettingsError::Missing(_)) => {
                output::error_stderr(&e.to_string());
                output::muted(&format!(
                    "Rebuild file by running: $ {} settings --rebuild",
                    paths::binary_name()
                ));
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        };

        let state = Arc::new(RunState::new());
        let handler = Arc::new(TerminationHandler::new(
            ctx.registry_path(),
            ctx.settings.indent.clone(),
            ctx.preview_dir(),
            state.clone(),
        ));
        install_panic_hook(handler.clone());

        let result = self.dispatch(&ctx, state, handler.clone());
        handler.fire(if result.is_ok() {
            ExitTrigger::Normal
        } else {
            ExitTrigger::Fault
        });
        result
    }

    fn dispatch(
        self,
        ctx: &Context,
        state: Arc<RunState>,
        handler: Arc<TerminationHandler>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match self.command {
            None if self.stop => commands::stop::run(ctx),
            None => {
                let rt = tokio::runtime::Runtime::new()?;
                let options = start::StartOptions {
                    ports: self.ports,
                    mode: self.mode,
                };
                rt.block_on(start::run(ctx, &options, state, handler))
            }
            Some(Commands::Status) => commands::status::run(ctx),
            Some(Commands::Ports) => commands::ports::run(ctx),
            Some(Commands::Open {
                file,
                port,
                directory,
                editor,
                wait,
                line,
                column,
                use_editor,
            }) => open::run(
                ctx,
                &open::OpenOptions {
                    file,
                    port,
                    directory,
                    editor,
                    wait,
                    line,
                    column,
                    use_editor,
                },
            ),
            Some(Commands::Stats {
                web,
                comprehensive,
                list,
            }) => stats::run(
                ctx,
                stats::StatsOptions {
                    web,
                    comprehensive,
                    list,
                },
            ),
            Some(Commands::Pretty { quick, staged }) => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(pretty::run(ctx, pretty::PrettyOptions { quick, staged }))
            }
            // Handled before settings are loaded.
            Some(Commands::Settings { .. }) => Ok(()),
        }
    }
}

/// A panic on the dispatching thread still runs the termination handler as a
/// fault. Panics inside runtime worker tasks do not end the process, so they
/// leave the instance registered.
fn install_panic_hook(handler: Arc<TerminationHandler>) {
    let owner = std::thread::current().id();
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default(info);
        fire_on_owner_panic(&handler, owner);
    }));
}

fn fire_on_owner_panic(
    handler: &TerminationHandler,
    owner: ThreadId,
) -> Option<TerminationOutcome> {
    (std::thread::current().id() == owner).then(|| handler.fire(ExitTrigger::Fault))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasker_core::{ProcessRecord, Registry};
    use tempfile::TempDir;

    #[test]
    fn default_task_defaults_to_development_mode() {
        let cli = Cli::try_parse_from(["tasker"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.stop);
        assert_eq!(cli.mode, "d");
        assert!(cli.ports.is_none());
    }

    #[test]
    fn default_task_accepts_short_flags() {
        let cli = Cli::try_parse_from(["tasker", "-m", "p", "-p", "4000:4001"]).unwrap();
        assert_eq!(cli.mode, "p");
        assert_eq!(cli.ports.as_deref(), Some("4000:4001"));

        let cli = Cli::try_parse_from(["tasker", "-s"]).unwrap();
        assert!(cli.stop);
    }

    #[test]
    fn ports_with_missing_local_slot_parse() {
        let cli = Cli::try_parse_from(["tasker", "--ports", ":3001"]).unwrap();
        assert_eq!(cli.ports.as_deref(), Some(":3001"));
    }

    #[test]
    fn unknown_mode_values_are_accepted() {
        let cli = Cli::try_parse_from(["tasker", "--mode", "staging"]).unwrap();
        assert_eq!(cli.mode, "staging");
    }

    #[test]
    fn open_editor_flags_parse() {
        let cli = Cli::try_parse_from([
            "tasker", "open", "-e", "index.html", "-w", "-l", "12", "-c", "20", "-u", "atom",
        ])
        .unwrap();
        let Some(Commands::Open {
            editor,
            wait,
            line,
            column,
            use_editor,
            ..
        }) = cli.command
        else {
            panic!("expected Open");
        };
        assert_eq!(editor.as_deref(), Some("index.html"));
        assert!(wait);
        assert_eq!((line, column), (Some(12), Some(20)));
        assert_eq!(use_editor.as_deref(), Some("atom"));
    }

    #[test]
    fn open_line_requires_editor() {
        let res = Cli::try_parse_from(["tasker", "open", "-F", "index.html", "-l", "3"]);
        assert!(res.is_err());
    }

    #[test]
    fn open_file_and_port_parse() {
        let cli =
            Cli::try_parse_from(["tasker", "open", "-F", "index.html", "-p", "3000"]).unwrap();
        let Some(Commands::Open { file, port, .. }) = cli.command else {
            panic!("expected Open");
        };
        assert_eq!(file.as_deref(), Some("index.html"));
        assert_eq!(port, Some(3000));
    }

    #[test]
    fn settings_force_requires_rebuild() {
        assert!(Cli::try_parse_from(["tasker", "settings", "--force"]).is_err());
        let cli = Cli::try_parse_from(["tasker", "settings", "--rebuild", "--force"]).unwrap();
        let Some(Commands::Settings { rebuild, force }) = cli.command else {
            panic!("expected Settings");
        };
        assert!(rebuild && force);
    }

    #[test]
    fn only_owner_thread_panics_run_cleanup() {
        let temp = TempDir::new().unwrap();
        let registry_path = temp.path().join("internal.json");
        let mut registry = Registry::read(&registry_path).unwrap();
        registry
            .set_process(Some(&ProcessRecord {
                pid: Some(77),
                ..ProcessRecord::default()
            }))
            .unwrap();
        registry.write().unwrap();

        let handler = Arc::new(
            TerminationHandler::new(
                registry_path.clone(),
                "\t",
                temp.path().join("previews"),
                Arc::new(RunState::new()),
            )
            .with_own_pid(77),
        );
        let owner = std::thread::current().id();

        let from_worker = {
            let handler = handler.clone();
            std::thread::spawn(move || fire_on_owner_panic(&handler, owner))
                .join()
                .unwrap()
        };
        assert_eq!(from_worker, None);
        assert_eq!(Registry::read(&registry_path).unwrap().recorded_pid(), Some(77));

        assert_eq!(
            fire_on_owner_panic(&handler, owner),
            Some(TerminationOutcome::CleanedUp { pid: 77 })
        );
        assert!(Registry::read(&registry_path).unwrap().process().unwrap().is_none());
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["tasker", "status", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }
}

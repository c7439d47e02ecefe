//! `tasker open`: files in the browser, files in an editor, directories in
//! the file manager.

use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};

use tasker_core::Mode;

use super::Context;
use crate::output;

#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub file: Option<String>,
    pub port: Option<u16>,
    pub directory: Option<String>,
    pub editor: Option<String>,
    pub wait: bool,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub use_editor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub fn run(ctx: &Context, options: &OpenOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(directory) = &options.directory {
        let dir = ctx.project_dir.join(directory_of(directory));
        if !dir.is_dir() {
            output::warning(&format!(
                "The directory {} does not exist.",
                output::highlight(dir.display())
            ));
            return Ok(());
        }
        return launch(&platform_opener(), &dir.to_string_lossy());
    }

    if let Some(file) = &options.editor {
        let path = ctx.project_dir.join(file);
        if !path.is_file() {
            output::warning(&format!(
                "The file {} does not exist.",
                output::highlight(path.display())
            ));
            return Ok(());
        }
        let editor = resolve_editor(ctx, options.use_editor.as_deref());
        let command = editor_command(&editor, file, options.line, options.column);
        tracing::debug!(program = %command.program, args = ?command.args, "opening editor");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&ctx.project_dir)
            .spawn()?;
        if options.wait {
            child.wait()?;
        }
        return Ok(());
    }

    let Some(file) = &options.file else {
        return Err("Provide a file to open with --file".into());
    };
    let recorded = ctx.read_registry()?.process()?;
    let port = browser_port(
        options.port,
        recorded.as_ref().and_then(|r| r.ports.local),
        recorded.as_ref().map(|r| r.mode),
    );
    let url = ctx.settings.app.url(file, port);
    let opener = match &ctx.settings.app.browser {
        Some(browser) => vec![browser.clone()],
        None => platform_opener(),
    };
    output::step(&format!("Opening {}", output::highlight(&url)));
    launch(&opener, &url)
}

/// Port for a browser URL: explicit flag, then the recorded local port. A
/// production instance has no server, so no port at all.
pub fn browser_port(flag: Option<u16>, recorded: Option<u16>, mode: Option<Mode>) -> Option<u16> {
    if mode == Some(Mode::Production) {
        return None;
    }
    flag.or(recorded)
}

/// Directory part of `path`: a path with an extension names a file, so its
/// parent is used.
pub fn directory_of(path: &str) -> PathBuf {
    let path = Path::new(path);
    let dir = if path.extension().is_some() {
        path.parent().unwrap_or(Path::new(""))
    } else {
        path
    };
    dir.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Editor string by precedence: `--use`, active settings editor, `$EDITOR`,
/// `$VISUAL`, then the platform default.
fn resolve_editor(ctx: &Context, use_editor: Option<&str>) -> String {
    let from_settings = || {
        let editor = &ctx.settings.editor;
        (editor.active && !editor.command.is_empty())
            .then(|| std::iter::once(editor.command.clone()).chain(editor.flags.iter().cloned()))
            .map(|parts| parts.collect::<Vec<_>>().join(" "))
    };
    let from_env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    use_editor
        .map(String::from)
        .or_else(from_settings)
        .or_else(|| from_env("EDITOR"))
        .or_else(|| from_env("VISUAL"))
        .unwrap_or_else(|| (if cfg!(windows) { "notepad" } else { "vim" }).to_string())
}

/// Build the editor invocation that opens `file` at `line`/`column`.
pub fn editor_command(
    editor: &str,
    file: &str,
    line: Option<u32>,
    column: Option<u32>,
) -> EditorCommand {
    let editor = editor.to_lowercase();
    let mut parts = editor.split_whitespace().map(String::from);
    let program = parts.next().unwrap_or_else(|| "vim".to_string());
    let mut args: Vec<String> = parts.collect();

    let line = line.unwrap_or(1);
    let column = column.unwrap_or(1);
    let name = Path::new(&program)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.clone());

    if name == "code" {
        args.push("--goto".to_string());
    }
    match name.as_str() {
        "atom" | "code" => args.extend(new_window_at(file, line, column)),
        n if n.starts_with("subl") => args.extend(new_window_at(file, line, column)),
        "gedit" => args.extend([
            "--new-window".to_string(),
            "--wait".to_string(),
            file.to_string(),
            format!("+{line}:{column}"),
        ]),
        "webstorm" | "intellij" => args.push(format!("{file}:{line}")),
        "textmate" => args.extend([
            "--line".to_string(),
            format!("{line}:{column}"),
            file.to_string(),
        ]),
        "vim" | "neovim" => args.extend([
            format!("+call cursor({line}, {column})"),
            file.to_string(),
        ]),
        _ => args.push(file.to_string()),
    }

    EditorCommand { program, args }
}

fn new_window_at(file: &str, line: u32, column: u32) -> [String; 3] {
    [
        "--new-window".to_string(),
        "--wait".to_string(),
        format!("{file}:{line}:{column}"),
    ]
}

fn platform_opener() -> Vec<String> {
    let parts: &[&str] = if cfg!(target_os = "macos") {
        &["open"]
    } else if cfg!(windows) {
        &["cmd", "/C", "start", ""]
    } else {
        &["xdg-open"]
    };
    parts.iter().map(|s| s.to_string()).collect()
}

fn launch(opener: &[String], target: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some((program, args)) = opener.split_first() else {
        return Err("No opener configured".into());
    };
    Command::new(program)
        .args(args)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to run {program}: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(editor: &str, line: Option<u32>, column: Option<u32>) -> (String, Vec<String>) {
        let c = editor_command(editor, "index.html", line, column);
        (c.program, c.args)
    }

    #[test]
    fn vscode_gets_goto_and_position() {
        let (program, args) = cmd("code", Some(12), Some(20));
        assert_eq!(program, "code");
        assert_eq!(args, vec!["--goto", "--new-window", "--wait", "index.html:12:20"]);
    }

    #[test]
    fn sublime_variants_share_atom_flags() {
        let (_, args) = cmd("subl3", None, None);
        assert_eq!(args, vec!["--new-window", "--wait", "index.html:1:1"]);
    }

    #[test]
    fn inline_flags_are_kept_and_editor_lowercased() {
        let (program, args) = cmd("Subl -w -n", Some(3), None);
        assert_eq!(program, "subl");
        assert_eq!(args, vec!["-w", "-n", "--new-window", "--wait", "index.html:3:1"]);
    }

    #[test]
    fn editor_specific_positions() {
        assert_eq!(
            cmd("gedit", Some(2), Some(5)).1,
            vec!["--new-window", "--wait", "index.html", "+2:5"]
        );
        assert_eq!(cmd("webstorm", Some(9), Some(1)).1, vec!["index.html:9"]);
        assert_eq!(
            cmd("textmate", Some(4), Some(2)).1,
            vec!["--line", "4:2", "index.html"]
        );
        assert_eq!(
            cmd("/usr/bin/vim", Some(7), Some(3)).1,
            vec!["+call cursor(7, 3)", "index.html"]
        );
        assert_eq!(cmd("nano", Some(7), Some(3)).1, vec!["index.html"]);
    }

    #[test]
    fn file_paths_open_their_directory() {
        assert_eq!(directory_of("docs/subextensions.md"), PathBuf::from("docs"));
        assert_eq!(directory_of("./docs"), PathBuf::from("docs"));
        assert_eq!(directory_of("."), PathBuf::new());
    }

    #[test]
    fn production_instances_get_no_port() {
        assert_eq!(browser_port(Some(4000), Some(3000), Some(Mode::Development)), Some(4000));
        assert_eq!(browser_port(None, Some(3000), Some(Mode::Server)), Some(3000));
        assert_eq!(browser_port(Some(4000), Some(3000), Some(Mode::Production)), None);
        assert_eq!(browser_port(None, None, None), None);
    }
}

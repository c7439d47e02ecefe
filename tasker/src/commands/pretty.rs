use super::Context;
use crate::formatter::{Formatter, Selection};
use crate::output;

#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyOptions {
    pub quick: bool,
    pub staged: bool,
}

impl PrettyOptions {
    pub fn selection(self) -> Selection {
        if self.quick || self.staged {
            Selection::Changed {
                staged: self.staged,
            }
        } else {
            Selection::All
        }
    }
}

pub async fn run(ctx: &Context, options: PrettyOptions) -> Result<(), Box<dyn std::error::Error>> {
    let formatter = Formatter::new(&ctx.project_dir, ctx.settings.formatter.clone());
    if !formatter.is_enabled() {
        output::muted("No formatter command configured.");
        return Ok(());
    }

    let files = formatter.files(options.selection())?;
    if files.is_empty() {
        output::muted("No files to format.");
        return Ok(());
    }

    let count = formatter.format(&files).await?;
    output::success(&format!("Formatted {count} file(s)."));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_implies_changed_selection() {
        let staged = PrettyOptions {
            quick: false,
            staged: true,
        };
        assert_eq!(staged.selection(), Selection::Changed { staged: true });

        let quick = PrettyOptions {
            quick: true,
            staged: false,
        };
        assert_eq!(quick.selection(), Selection::Changed { staged: false });
        assert_eq!(PrettyOptions::default().selection(), Selection::All);
    }
}

//! `tasker stats`: file-extension breakdown of the project.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::Context;
use crate::output;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsOptions {
    pub web: bool,
    pub comprehensive: bool,
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRow {
    pub extension: String,
    pub count: usize,
    /// Rounded share of all counted files
    pub percent: u32,
}

pub fn run(ctx: &Context, options: StatsOptions) -> Result<(), Box<dyn std::error::Error>> {
    let filter: Option<&[String]> = if options.comprehensive {
        Some(ctx.settings.stats.code.as_slice())
    } else if options.web {
        Some(ctx.settings.stats.web.as_slice())
    } else {
        None
    };

    let files = collect(&ctx.project_dir, filter)?;
    if files.is_empty() {
        output::muted("No files found.");
        return Ok(());
    }

    if options.list {
        for file in &files {
            let shown = file.strip_prefix(&ctx.project_dir).unwrap_or(file);
            output::muted(&shown.display().to_string());
        }
    }

    let rows = tally(&files);
    let header = format!("Count ({})", files.len());
    println!(
        "{:<12} {:>12} {:>14}",
        output::brand_success("Extensions"),
        output::brand_success(&header),
        output::brand_success("% Of Project")
    );
    for row in rows {
        println!("{:<12} {:>12} {:>14}", row.extension, row.count, row.percent);
    }
    Ok(())
}

/// Non-ignored project files with an extension, optionally restricted to
/// `filter` extensions.
pub fn collect(root: &Path, filter: Option<&[String]>) -> Result<Vec<PathBuf>, ignore::Error> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(ext) = extension(entry.path()) else {
            continue;
        };
        if filter.is_some_and(|allowed| !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))) {
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort();
    Ok(files)
}

/// Count files per extension, sorted by share descending, then name.
pub fn tally(files: &[PathBuf]) -> Vec<ExtensionRow> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        if let Some(ext) = extension(file) {
            *counts.entry(ext).or_default() += 1;
        }
    }
    let total = files.len().max(1) as f64;
    let mut rows: Vec<ExtensionRow> = counts
        .into_iter()
        .map(|(ext, count)| ExtensionRow {
            extension: format!(".{ext}"),
            count,
            percent: (count as f64 / total * 100.0).round() as u32,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.extension.cmp(&b.extension)));
    rows
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tally_sorts_by_share() {
        let files: Vec<PathBuf> = ["a.js", "b.js", "c.JS", "d.css", "e.html", "f.html"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let rows = tally(&files);
        assert_eq!(
            rows,
            vec![
                ExtensionRow {
                    extension: ".js".into(),
                    count: 3,
                    percent: 50,
                },
                ExtensionRow {
                    extension: ".html".into(),
                    count: 2,
                    percent: 33,
                },
                ExtensionRow {
                    extension: ".css".into(),
                    count: 1,
                    percent: 17,
                },
            ]
        );
    }

    #[test]
    fn collect_skips_extensionless_and_filtered_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Makefile"), "").unwrap();
        std::fs::write(temp.path().join("app.js"), "").unwrap();
        std::fs::write(temp.path().join("main.rs"), "").unwrap();

        let all = collect(temp.path(), None).unwrap();
        assert_eq!(all.len(), 2);

        let web = vec!["js".to_string()];
        let filtered = collect(temp.path(), Some(web.as_slice())).unwrap();
        assert_eq!(filtered, vec![temp.path().join("app.js")]);
    }
}

//! Output formatting and styling module.
//!
//! All user-facing terminal text goes through [`OutputFormatter`], so the
//! engine modules only ever log through `tracing` and the CLI decides how
//! results look.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

use crate::duplicates::GroupOutcome;
use crate::progress::BatchReport;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use filewarden::output::OutputFormatter;
    /// OutputFormatter::success("Directory organized");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for file operations.
    ///
    /// The length is updated by the running batch, so `total` may be a guess.
    ///
    /// ```no_run
    /// use filewarden::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    /// Prints a table of file counts per destination folder.
    ///
    /// ```no_run
    /// use filewarden::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Docs".to_string(), 15);
    /// counts.insert("Pictures".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = folder_counts
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(6); // "Folder"

        println!("{:<width$} | {}", "Folder".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));

        for (folder, count) in folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                plural(*count, "file", "files"),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files, "file", "files"),
            width = width
        );
    }

    /// Prints the outcome of a batch: counts, then every failure.
    pub fn batch_report(verb: &str, report: &BatchReport) {
        let counts = format!(
            "{} {}, {} skipped, {} failed",
            report.succeeded,
            verb,
            report.skipped,
            report.failed()
        );
        if report.cancelled {
            Self::warning(&format!("Cancelled: {}", counts));
        } else if report.failures.is_empty() {
            Self::success(&counts);
        } else {
            Self::warning(&counts);
        }
        for failure in &report.failures {
            Self::error(&format!("{}: {}", failure.path.display(), failure.reason));
        }
    }

    /// Lists every duplicate group, marking the copy that would be kept.
    pub fn duplicate_report(outcome: &GroupOutcome) {
        if outcome.groups.is_empty() {
            Self::success("No duplicates found");
            return;
        }

        for (index, group) in outcome.groups.iter().enumerate() {
            Self::header(&format!(
                "Group {} · {} copies · {} each",
                index + 1,
                group.members.len(),
                human_bytes(group.size())
            ));
            Self::plain(&format!("  sha256 {}", group.fingerprint.as_str().dimmed()));
            let keeper = group.keeper().map(|k| k.path.as_path());
            for member in &group.members {
                let marker = if Some(member.path.as_path()) == keeper {
                    "keep".green()
                } else {
                    "dup ".yellow()
                };
                println!("  {} {}", marker, member.path.display());
            }
        }

        Self::header("SUMMARY");
        Self::plain(&format!(
            "{} {}, {} redundant {}, {} reclaimable",
            outcome.groups.len(),
            plural(outcome.groups.len(), "group", "groups"),
            outcome.duplicate_files(),
            plural(outcome.duplicate_files(), "file", "files"),
            human_bytes(outcome.wasted_bytes()).bold()
        ));
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// Formats a byte count with a binary unit, e.g. `1.5 MiB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

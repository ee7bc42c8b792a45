//! Command-line interface module for filewarden.
//!
//! Parses arguments with clap, loads settings, and drives the engine
//! modules. Everything here reports through [`OutputFormatter`] and maps
//! engine errors to plain strings for `main`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::backup::{BackupOptions, run_backup_now};
use crate::config::{ScanFilter, Settings, SettingsStore};
use crate::duplicates::{GroupOptions, delete_redundant, find_duplicates};
use crate::organizer::{self, OrganizeOptions};
use crate::output::OutputFormatter;
use crate::progress::CancelToken;
use crate::renamer::{DEFAULT_DATE_PATTERN, RenameOptions, RenameScheme, rename_images};
use crate::schedule::DailySchedule;
use crate::undo::UndoManager;

/// Organize, rename, deduplicate and back up directories.
#[derive(Parser, Debug)]
#[command(name = "filewarden", version, about)]
pub struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug details to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move files into subfolders by extension.
    Organize {
        dir: PathBuf,
        /// Show what would move without touching anything.
        #[arg(long)]
        dry_run: bool,
        /// Only organize files directly inside DIR.
        #[arg(long)]
        shallow: bool,
    },
    /// Revert the last organize or rename run in DIR.
    Undo { dir: PathBuf },
    /// Rename the images directly inside DIR.
    Rename {
        dir: PathBuf,
        /// strftime pattern applied to each file's modification time.
        #[arg(long, conflicts_with = "prefix")]
        pattern: Option<String>,
        /// Name files PREFIX_<n> instead of by date.
        #[arg(long)]
        prefix: Option<String>,
        /// First number used with --prefix.
        #[arg(long, default_value_t = 1)]
        start: u64,
    },
    /// Find files with identical content.
    Dupes {
        root: PathBuf,
        /// Delete every copy except the first of each group.
        #[arg(long)]
        delete: bool,
        /// Hash every file instead of only files that share a size.
        #[arg(long)]
        no_size_filter: bool,
        /// Ignore the configured scan filters.
        #[arg(long)]
        all_files: bool,
    },
    /// Copy a directory tree into a backup directory now.
    Backup {
        /// Defaults to the configured backup source.
        #[arg(long)]
        source: Option<PathBuf>,
        /// Defaults to the configured backup target.
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// Run the configured daily backup until interrupted.
    Schedule,
    /// Show or edit the extension to folder rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RulesAction {
    List,
    Add { extension: String, folder: String },
    Remove { extension: String },
}

/// Runs a parsed command line.
///
/// `cancel` is shared with whatever interrupts the process (Ctrl-C in
/// `main`); long runs stop between files once it fires.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use filewarden::cli::{Cli, run_cli};
/// use filewarden::progress::CancelToken;
///
/// let cli = Cli::parse_from(["filewarden", "organize", "/path/to/directory", "--dry-run"]);
/// if let Err(e) = run_cli(cli, &CancelToken::new()) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli, cancel: &CancelToken) -> Result<(), String> {
    let store = SettingsStore::locate(cli.config.as_deref());
    run_command(cli.command, &store, cancel)
}

/// Runs one command against the settings kept in `store`.
pub fn run_command(command: Command, store: &SettingsStore, cancel: &CancelToken) -> Result<(), String> {
    let (mut settings, load_error) = store.load();
    if let Some(e) = load_error {
        OutputFormatter::warning(&format!("{}; using default settings", e));
    }

    match command {
        Command::Organize {
            dir,
            dry_run,
            shallow,
        } => {
            let options = OrganizeOptions {
                recursive: !shallow,
                progress: None,
                cancel: Some(cancel),
            };
            if dry_run {
                organize_dry_run(&dir, &settings, &options)
            } else {
                organize_directory(&dir, &settings, options)
            }
        }
        Command::Undo { dir } => undo_last_run(&dir),
        Command::Rename {
            dir,
            pattern,
            prefix,
            start,
        } => {
            let scheme = match prefix {
                Some(prefix) => RenameScheme::Prefix { prefix, start },
                None => RenameScheme::Date {
                    pattern: pattern.unwrap_or_else(|| DEFAULT_DATE_PATTERN.to_string()),
                },
            };
            rename_directory(&dir, &scheme, cancel)
        }
        Command::Dupes {
            root,
            delete,
            no_size_filter,
            all_files,
        } => {
            let filter = if all_files {
                ScanFilter::allow_all()
            } else {
                settings.filters.compile().map_err(|e| e.to_string())?
            };
            report_duplicates(&root, &filter, !no_size_filter, delete, cancel)
        }
        Command::Backup { source, target } => {
            let configured = settings.backup_paths();
            let source = source.or_else(|| configured.as_ref().map(|(s, _)| s.clone()));
            let target = target.or_else(|| configured.as_ref().map(|(_, t)| t.clone()));
            let (Some(source), Some(target)) = (source, target) else {
                return Err(
                    "Backup needs --source and --target, or both paths in the settings".to_string(),
                );
            };
            backup_now(&source, &target, cancel)
        }
        Command::Schedule => {
            let schedule =
                DailySchedule::from_settings(&settings, store.path()).map_err(|e| e.to_string())?;
            OutputFormatter::info(&format!(
                "Backing up {} to {} daily at {:02}:{:02}. Press Ctrl-C to stop.",
                schedule.source.display(),
                schedule.target.display(),
                schedule.hour,
                schedule.minute
            ));
            schedule.run(cancel, |result| match result {
                Ok(report) => OutputFormatter::batch_report("copied", report),
                Err(e) => OutputFormatter::error(&format!("Scheduled backup failed: {}", e)),
            });
            Ok(())
        }
        Command::Rules { action } => edit_rules(action, store, &mut settings),
    }
}

fn organize_dry_run(dir: &Path, settings: &Settings, options: &OrganizeOptions<'_>) -> Result<(), String> {
    let plan = organizer::plan_organize(dir, settings, options).map_err(|e| e.to_string())?;
    OutputFormatter::dry_run_notice(&format!("Analyzing contents of: {}", plan.base.display()));

    if plan.total() == 0 {
        OutputFormatter::plain("No files found to organize.");
        return Ok(());
    }

    for (folder, plans) in &plan.by_folder {
        for relocation in plans {
            let shown = relocation
                .source
                .strip_prefix(&plan.base)
                .unwrap_or(&relocation.source);
            OutputFormatter::plain(&format!(" - {}", shown.display()));
            OutputFormatter::plain(&format!("   → Would move to {}/", folder));
        }
    }
    OutputFormatter::summary_table(&plan.folder_counts(), plan.total());
    if plan.already_in_place > 0 {
        OutputFormatter::plain(&format!("{} already in place", plan.already_in_place));
    }
    OutputFormatter::dry_run_notice("No files were modified.");
    Ok(())
}

fn organize_directory(dir: &Path, settings: &Settings, options: OrganizeOptions<'_>) -> Result<(), String> {
    OutputFormatter::info(&format!("Organizing contents of: {}", dir.display()));

    let pb = OutputFormatter::create_progress_bar(0);
    let options = OrganizeOptions {
        progress: Some(&pb),
        ..options
    };
    let outcome = organizer::organize(dir, settings, &options).map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    if !outcome.moved_per_folder.is_empty() {
        OutputFormatter::summary_table(&outcome.moved_per_folder, outcome.report.succeeded);
    }
    OutputFormatter::batch_report("moved", &outcome.report);

    match outcome.history_error {
        Some(e) => OutputFormatter::warning(&format!(
            "Could not save history, undo will not be available: {}",
            e
        )),
        None if outcome.report.succeeded > 0 => OutputFormatter::plain(&format!(
            "History saved. Use 'filewarden undo {}' to revert changes.",
            dir.display()
        )),
        None => {}
    }
    Ok(())
}

fn undo_last_run(dir: &Path) -> Result<(), String> {
    OutputFormatter::info("Undoing previous run...");
    let report = UndoManager::undo(dir).map_err(|e| e.to_string())?;
    OutputFormatter::batch_report("restored", &report);
    if !report.is_complete_success() || report.skipped > 0 {
        OutputFormatter::warning("History file was kept; fix the issues above and run undo again.");
    }
    Ok(())
}

fn rename_directory(dir: &Path, scheme: &RenameScheme, cancel: &CancelToken) -> Result<(), String> {
    let pb = OutputFormatter::create_progress_bar(0);
    let options = RenameOptions {
        progress: Some(&pb),
        cancel: Some(cancel),
    };
    let outcome = rename_images(dir, scheme, &options).map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    for operation in &outcome.log.operations {
        OutputFormatter::plain(&format!(
            " - {} → {}",
            file_name(&operation.original_path),
            file_name(&operation.new_path)
        ));
    }
    OutputFormatter::batch_report("renamed", &outcome.report);
    if let Some(e) = outcome.history_error {
        OutputFormatter::warning(&format!("Could not save history: {}", e));
    }
    Ok(())
}

fn report_duplicates(
    root: &Path,
    filter: &ScanFilter,
    size_prefilter: bool,
    delete: bool,
    cancel: &CancelToken,
) -> Result<(), String> {
    let pb = OutputFormatter::create_progress_bar(0);
    let options = GroupOptions {
        size_prefilter,
        progress: Some(&pb),
        cancel: Some(cancel),
    };
    let outcome = find_duplicates(root, filter, &options).map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    OutputFormatter::duplicate_report(&outcome);
    if !outcome.report.failures.is_empty() || outcome.report.cancelled {
        OutputFormatter::batch_report("hashed", &outcome.report);
    }

    if delete && !outcome.report.cancelled && !outcome.groups.is_empty() {
        let report = delete_redundant(&outcome.groups, Some(cancel));
        OutputFormatter::batch_report("deleted", &report);
    }
    Ok(())
}

fn backup_now(source: &Path, target: &Path, cancel: &CancelToken) -> Result<(), String> {
    OutputFormatter::info(&format!(
        "Backing up {} to {}",
        source.display(),
        target.display()
    ));
    let pb = OutputFormatter::create_progress_bar(0);
    let options = BackupOptions {
        progress: Some(&pb),
        cancel: Some(cancel),
    };
    let report = run_backup_now(source, target, &options).map_err(|e| e.to_string())?;
    pb.finish_and_clear();
    OutputFormatter::batch_report("copied", &report);
    Ok(())
}

fn edit_rules(action: RulesAction, store: &SettingsStore, settings: &mut Settings) -> Result<(), String> {
    match action {
        RulesAction::List => {
            OutputFormatter::header("RULES");
            for (extension, folder) in settings.category_map.iter() {
                OutputFormatter::plain(&format!("{:>8} → {}/", extension, folder));
            }
        }
        RulesAction::Add { extension, folder } => {
            store
                .add_rule(settings, &extension, &folder)
                .map_err(|e| e.to_string())?;
            OutputFormatter::success(&format!(
                "Files ending in .{} now go to {}/",
                extension.trim().trim_start_matches('.'),
                folder
            ));
        }
        RulesAction::Remove { extension } => {
            match store
                .remove_rule(settings, &extension)
                .map_err(|e| e.to_string())?
            {
                Some(folder) => OutputFormatter::success(&format!(
                    "Removed rule .{} → {}/",
                    extension, folder
                )),
                None => OutputFormatter::warning(&format!("No rule for .{}", extension)),
            }
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_organize() {
        let cli = Cli::parse_from(["filewarden", "organize", "/tmp/x", "--dry-run"]);
        assert_eq!(
            cli.command,
            Command::Organize {
                dir: PathBuf::from("/tmp/x"),
                dry_run: true,
                shallow: false,
            }
        );
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["filewarden", "undo", "dir", "-v", "--config", "s.json"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("s.json")));
    }

    #[test]
    fn test_parse_rename_prefix() {
        let cli = Cli::parse_from(["filewarden", "rename", "pics", "--prefix", "Trip", "--start", "3"]);
        assert_eq!(
            cli.command,
            Command::Rename {
                dir: PathBuf::from("pics"),
                pattern: None,
                prefix: Some("Trip".to_string()),
                start: 3,
            }
        );
    }

    #[test]
    fn test_pattern_and_prefix_conflict() {
        let result = Cli::try_parse_from([
            "filewarden", "rename", "pics", "--pattern", "%Y", "--prefix", "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rules_add() {
        let cli = Cli::parse_from(["filewarden", "rules", "add", "pdf", "Papers"]);
        assert_eq!(
            cli.command,
            Command::Rules {
                action: RulesAction::Add {
                    extension: "pdf".to_string(),
                    folder: "Papers".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

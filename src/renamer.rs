/// Batch renaming of the images in one directory.
///
/// Files are visited in name order. Each gets a new stem, either its
/// modification time rendered through a strftime pattern or a prefix with a
/// running number, while the original extension is kept as written.
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::classification::{extension_of, is_image_extension};
use crate::error::{WardenError, WardenResult};
use crate::progress::{self, BatchReport, CancelToken, ProgressSink};
use crate::relocation::{RelocationMode, relocate};
use crate::undo::{Operation, OperationLog, RunKind};
use crate::walker::{self, FileRecord};

/// Pattern used when none is given.
pub const DEFAULT_DATE_PATTERN: &str = "%Y%m%d_%H%M%S";

/// How new names are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameScheme {
    /// Local modification time, formatted with a chrono strftime pattern.
    Date { pattern: String },
    /// `<prefix>_<n>`, numbering from `start` in visiting order.
    Prefix { prefix: String, start: u64 },
}

impl Default for RenameScheme {
    fn default() -> Self {
        RenameScheme::Date {
            pattern: DEFAULT_DATE_PATTERN.to_string(),
        }
    }
}

impl RenameScheme {
    /// Rejects patterns chrono cannot render and stems that would leave the
    /// directory.
    pub fn validate(&self) -> WardenResult<()> {
        match self {
            RenameScheme::Date { pattern } => {
                if pattern.trim().is_empty() {
                    return Err(WardenError::InvalidRule {
                        reason: "date pattern is empty".to_string(),
                    });
                }
                if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(WardenError::InvalidRule {
                        reason: format!("invalid date pattern '{}'", pattern),
                    });
                }
                if pattern.contains(['/', '\\']) {
                    return Err(WardenError::InvalidRule {
                        reason: format!("date pattern '{}' contains a path separator", pattern),
                    });
                }
            }
            RenameScheme::Prefix { prefix, .. } => {
                if prefix.contains(['/', '\\']) {
                    return Err(WardenError::InvalidRule {
                        reason: format!("prefix '{}' contains a path separator", prefix),
                    });
                }
            }
        }
        Ok(())
    }

    /// New file name for the `index`th visited file (zero-based).
    fn file_name_for(&self, record: &FileRecord, index: u64) -> WardenResult<String> {
        let name = record.file_name();
        let extension = extension_of(&name);
        let mut stem = String::new();
        match self {
            RenameScheme::Date { pattern } => {
                let local: DateTime<Local> = record.modified.into();
                write!(stem, "{}", local.format(pattern)).map_err(|_| {
                    WardenError::InvalidRule {
                        reason: format!("cannot render date pattern '{}'", pattern),
                    }
                })?;
            }
            RenameScheme::Prefix { prefix, start } => {
                stem = format!("{}_{}", prefix.trim(), start + index);
            }
        }
        if extension.is_empty() {
            Ok(stem)
        } else {
            Ok(format!("{}.{}", stem, extension))
        }
    }
}

#[derive(Default)]
pub struct RenameOptions<'a> {
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: Option<&'a CancelToken>,
}

/// Result of a rename run.
#[derive(Debug)]
pub struct RenameOutcome {
    pub report: BatchReport,
    pub log: OperationLog,
    pub history_error: Option<WardenError>,
}

/// Renames the images directly inside `dir` according to `scheme`.
///
/// Subdirectories are not entered and non-image files are left alone. A file
/// that already carries its target name is counted as skipped; an occupied
/// target gets the `_N` collision suffix. The run is recorded for undo.
///
/// # Errors
///
/// Returns `InvalidRoot` for a bad directory and `InvalidRule` for a scheme
/// that cannot produce file names. Nothing is renamed in either case.
pub fn rename_images(
    dir: &Path,
    scheme: &RenameScheme,
    options: &RenameOptions<'_>,
) -> WardenResult<RenameOutcome> {
    scheme.validate()?;
    let dir = walker::validate_root(dir)?;
    let (records, warnings) = walker::walk_with_depth(&dir, Some(1))?.collect_with_warnings();
    let images: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| is_image_extension(extension_of(&r.file_name())))
        .collect();
    info!(dir = %dir.display(), images = images.len(), "renaming images");

    let mut report = BatchReport::new();
    for warning in warnings {
        report.record_failure(&warning.path, warning.reason);
    }
    let mut log = OperationLog::new(dir.clone(), RunKind::Rename);

    let total = images.len();
    for (index, record) in images.iter().enumerate() {
        if progress::cancelled(options.cancel) {
            report.cancelled = true;
            break;
        }
        let current = record.file_name();
        progress::notify(options.progress, index + 1, total, &current);

        let new_name = match scheme.file_name_for(record, index as u64) {
            Ok(name) => name,
            Err(e) => {
                report.record_failure(&record.path, e);
                continue;
            }
        };
        if new_name == current {
            debug!(path = %record.path.display(), "already named, skipping");
            report.record_skip();
            continue;
        }

        match rename_one(&record.path, &dir.join(&new_name)) {
            Ok(new_path) => {
                report.record_success();
                log.add_operation(Operation {
                    original_path: record.path.clone(),
                    new_path,
                    folder: String::new(),
                });
            }
            Err(e) => {
                warn!(path = %record.path.display(), error = %e, "could not rename");
                report.record_failure(&record.path, e);
            }
        }
    }

    let history_error = if log.operations.is_empty() {
        None
    } else {
        log.save(&dir).err()
    };
    if let Some(e) = &history_error {
        warn!(error = %e, "could not save undo history");
    }

    Ok(RenameOutcome {
        report,
        log,
        history_error,
    })
}

fn rename_one(source: &Path, desired: &Path) -> WardenResult<PathBuf> {
    let new_path = relocate(source, desired, RelocationMode::Move)?;
    debug!(from = %source.display(), to = %new_path.display(), "renamed");
    Ok(new_path)
}

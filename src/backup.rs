/// One-shot mirroring of a source tree into a backup directory.
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::error::{WardenError, WardenResult};
use crate::progress::{self, BatchReport, CancelToken, ProgressSink};
use crate::relocation::{RelocationMode, relocate};
use crate::walker::{self, FileRecord};

#[derive(Default)]
pub struct BackupOptions<'a> {
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: Option<&'a CancelToken>,
}

enum FileResult {
    Copied,
    Unchanged,
    Failed(WardenError),
    Cancelled,
}

/// Copies every regular file under `source` to the same relative path under
/// `destination`, replacing older copies.
///
/// Files whose backup already has the same size and modification time are
/// skipped, so repeated runs only copy what changed. Copies keep permissions
/// and timestamps.
///
/// # Errors
///
/// Returns `InvalidRoot` if `source` is not a directory, or if `destination`
/// lies inside `source` (the backup would back itself up).
pub fn run_backup_now(
    source: &Path,
    destination: &Path,
    options: &BackupOptions<'_>,
) -> WardenResult<BatchReport> {
    let source = walker::validate_root(source)?;
    let destination = std::path::absolute(destination)
        .map_err(|e| WardenError::invalid_root(destination, e.to_string()))?;
    if destination.starts_with(&source) {
        return Err(WardenError::invalid_root(
            &destination,
            "backup target lies inside the source",
        ));
    }

    let (records, warnings) = walker::walk(&source)?.collect_with_warnings();
    info!(
        source = %source.display(),
        destination = %destination.display(),
        files = records.len(),
        "starting backup"
    );

    let total = records.len();
    let processed = AtomicUsize::new(0);

    let results: Vec<FileResult> = records
        .par_iter()
        .map(|record| {
            if progress::cancelled(options.cancel) {
                return FileResult::Cancelled;
            }
            let relative = record.path.strip_prefix(&source).unwrap_or(&record.path);
            let result = match back_up_file(record, &destination.join(relative)) {
                Ok(true) => FileResult::Copied,
                Ok(false) => FileResult::Unchanged,
                Err(e) => {
                    warn!(path = %record.path.display(), error = %e, "backup failed");
                    FileResult::Failed(e)
                }
            };
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            progress::notify(options.progress, done, total, &relative.to_string_lossy());
            result
        })
        .collect();

    let mut report = BatchReport::new();
    for warning in warnings {
        report.record_failure(&warning.path, warning.reason);
    }
    for (record, result) in records.iter().zip(results) {
        match result {
            FileResult::Copied => report.record_success(),
            FileResult::Unchanged => report.record_skip(),
            FileResult::Failed(e) => report.record_failure(&record.path, e),
            FileResult::Cancelled => report.cancelled = true,
        }
    }

    info!(
        copied = report.succeeded,
        unchanged = report.skipped,
        failed = report.failed(),
        "backup finished"
    );
    Ok(report)
}

/// Copies one file unless its backup is already current. Returns whether a
/// copy was made.
fn back_up_file(record: &FileRecord, target: &Path) -> WardenResult<bool> {
    if is_current(record, target) {
        debug!(path = %target.display(), "backup up to date");
        return Ok(false);
    }
    relocate(&record.path, target, RelocationMode::Copy { replace: true })?;
    Ok(true)
}

fn is_current(record: &FileRecord, target: &Path) -> bool {
    match fs::symlink_metadata(target) {
        Ok(meta) => {
            meta.is_file()
                && meta.len() == record.size
                && meta.modified().is_ok_and(|m| m == record.modified)
        }
        Err(_) => false,
    }
}

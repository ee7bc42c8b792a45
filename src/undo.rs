/// Run history and undo for organize and rename runs.
///
/// Each run that moves files records where every file came from in a hidden
/// JSON file inside the directory it operated on. Undo walks that record
/// backwards and moves files home again, never overwriting whatever has since
/// appeared at an original location.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{WardenError, WardenResult};
use crate::progress::BatchReport;
use crate::relocation::relocate_with_fallback;

/// File name of the history record inside an operated directory.
pub const HISTORY_FILE_NAME: &str = ".filewarden_history.json";

/// Which feature produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Organize,
    Rename,
}

/// One file movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Where the file was before the run.
    pub original_path: PathBuf,
    /// Where the run put it.
    pub new_path: PathBuf,
    /// Destination folder for organize runs, empty for renames.
    #[serde(default)]
    pub folder: String,
}

/// Everything one run moved, persisted for undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    /// RFC 3339 timestamp of the run.
    pub timestamp: String,
    pub base_path: PathBuf,
    pub kind: RunKind,
    pub operations: Vec<Operation>,
}

impl OperationLog {
    pub fn new(base_path: PathBuf, kind: RunKind) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            base_path,
            kind,
            operations: Vec::new(),
        }
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Path of the history file for `base_path`.
    pub fn history_file_path(base_path: &Path) -> PathBuf {
        base_path.join(HISTORY_FILE_NAME)
    }

    /// Writes this log, replacing any previous run's history.
    pub fn save(&self, base_path: &Path) -> WardenResult<()> {
        let path = Self::history_file_path(base_path);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            WardenError::write(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        fs::write(&path, json).map_err(|e| WardenError::write(&path, e))?;
        debug!(path = %path.display(), operations = self.operations.len(), "saved history");
        Ok(())
    }

    /// Loads the history for `base_path`, or `None` if there is none.
    pub fn load(base_path: &Path) -> WardenResult<Option<Self>> {
        let path = Self::history_file_path(base_path);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WardenError::read(&path, e)),
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| WardenError::Configuration {
                path,
                reason: format!("invalid history file: {}", e),
            })
    }

    /// Removes the history file, if present.
    pub fn delete(base_path: &Path) -> WardenResult<()> {
        let path = Self::history_file_path(base_path);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WardenError::write(&path, e)),
        }
    }
}

/// Reverts the most recent recorded run.
pub struct UndoManager;

impl UndoManager {
    /// Moves every file of the last run in `base_path` back where it came from.
    ///
    /// Operations are reverted newest first. A file that is no longer at its
    /// recorded location is skipped; an original location that is occupied
    /// again gets the `_N` collision suffix instead of being overwritten. The
    /// history is deleted only if every file was restored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRoot` if `base_path` is not a directory or has no
    /// history, and `Configuration` if the history cannot be parsed.
    pub fn undo(base_path: &Path) -> WardenResult<BatchReport> {
        let base_path = &crate::walker::validate_root(base_path)?;
        let log = OperationLog::load(base_path)?.ok_or_else(|| {
            WardenError::invalid_root(base_path, "no previous run recorded to undo")
        })?;
        info!(
            base = %base_path.display(),
            kind = ?log.kind,
            operations = log.operations.len(),
            "undoing run"
        );

        let mut report = BatchReport::new();
        for operation in log.operations.iter().rev() {
            if fs::symlink_metadata(&operation.new_path).is_err() {
                warn!(path = %operation.new_path.display(), "file not found at recorded location");
                report.record_skip();
                continue;
            }
            match relocate_with_fallback(&operation.new_path, &operation.original_path, true) {
                Ok(restored) => {
                    if restored != operation.original_path {
                        warn!(
                            wanted = %operation.original_path.display(),
                            used = %restored.display(),
                            "original location taken, restored under a new name"
                        );
                    }
                    report.record_success();
                    Self::remove_empty_folder(base_path, &operation.new_path);
                }
                Err(e) => report.record_failure(&operation.new_path, e),
            }
        }

        if report.is_complete_success()
            && report.skipped == 0
            && let Err(e) = OperationLog::delete(base_path)
        {
            warn!(error = %e, "could not delete history file");
        }
        Ok(report)
    }

    /// Removes the folder a file was moved into if the undo left it empty.
    fn remove_empty_folder(base_path: &Path, moved_file: &Path) {
        if let Some(parent) = moved_file.parent()
            && parent != base_path
            && parent.starts_with(base_path)
        {
            // Fails harmlessly while the folder still has content.
            let _ = fs::remove_dir(parent);
        }
    }
}

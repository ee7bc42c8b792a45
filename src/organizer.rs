/// Organizing a directory into extension-based subfolders.
///
/// Organizing happens in two steps. [`plan_organize`] walks the directory,
/// classifies every file and groups the resulting moves by target folder
/// without touching anything (this is also the dry run). [`organize`] then
/// executes the plan: each target folder is created once, folders are worked
/// on in parallel, and files within one folder are moved one after another so
/// collision suffixes are assigned without races.
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::classification::{ClassificationRules, classify};
use crate::config::{ScanFilter, Settings};
use crate::error::{WardenError, WardenResult};
use crate::progress::{self, BatchReport, CancelToken, ProgressSink};
use crate::relocation::RelocationPlan;
use crate::undo::{HISTORY_FILE_NAME, Operation, OperationLog, RunKind};
use crate::walker::{self, WalkWarning};

/// Knobs for an organize run.
pub struct OrganizeOptions<'a> {
    /// Descend into subdirectories (the default) or only look at the top level.
    pub recursive: bool,
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: Option<&'a CancelToken>,
}

impl Default for OrganizeOptions<'_> {
    fn default() -> Self {
        Self {
            recursive: true,
            progress: None,
            cancel: None,
        }
    }
}

/// What an organize run would do.
#[derive(Debug, Clone, Default)]
pub struct OrganizePlan {
    /// Absolute directory being organized.
    pub base: PathBuf,
    /// Planned moves, keyed by destination folder name.
    pub by_folder: BTreeMap<String, Vec<RelocationPlan>>,
    /// Files already sitting in their destination folder.
    pub already_in_place: usize,
    /// Files no rule (and no wildcard) applies to.
    pub unclassified: usize,
    /// Unreadable entries the walk skipped.
    pub warnings: Vec<WalkWarning>,
}

impl OrganizePlan {
    /// Number of files that would move.
    pub fn total(&self) -> usize {
        self.by_folder.values().map(Vec::len).sum()
    }

    /// Files per destination folder.
    pub fn folder_counts(&self) -> BTreeMap<String, usize> {
        self.by_folder
            .iter()
            .map(|(folder, plans)| (folder.clone(), plans.len()))
            .collect()
    }
}

/// Result of an executed organize run.
#[derive(Debug)]
pub struct OrganizeOutcome {
    pub report: BatchReport,
    /// Files actually moved, per destination folder.
    pub moved_per_folder: BTreeMap<String, usize>,
    /// The recorded moves (also saved for undo when non-empty).
    pub log: OperationLog,
    /// Set if the undo history could not be written.
    pub history_error: Option<WardenError>,
}

/// Plans an organize run over `base` without changing anything.
///
/// # Errors
///
/// Returns `InvalidRoot` if `base` is not a directory and `InvalidRule` if
/// the configured filters do not compile.
pub fn plan_organize(
    base: &Path,
    settings: &Settings,
    options: &OrganizeOptions<'_>,
) -> WardenResult<OrganizePlan> {
    let filter = settings.filters.compile()?;
    plan_with(base, &settings.category_map, &filter, options.recursive)
}

fn plan_with(
    base: &Path,
    rules: &ClassificationRules,
    filter: &ScanFilter,
    recursive: bool,
) -> WardenResult<OrganizePlan> {
    let base = walker::validate_root(base)?;
    let depth = if recursive { None } else { Some(1) };
    let (records, warnings) = walker::walk_with_depth(&base, depth)?.collect_with_warnings();

    let mut plan = OrganizePlan {
        base: base.clone(),
        warnings,
        ..Default::default()
    };

    for record in records {
        let file_name = record.file_name();
        if file_name == HISTORY_FILE_NAME {
            continue;
        }
        let relative = record.path.strip_prefix(&base).unwrap_or(&record.path);
        if !filter.should_include(relative) {
            continue;
        }

        let Some(folder) = classify(&file_name, rules) else {
            plan.unclassified += 1;
            continue;
        };

        let target_dir = base.join(folder);
        if record.path.parent() == Some(target_dir.as_path()) {
            plan.already_in_place += 1;
            continue;
        }

        plan.by_folder
            .entry(folder.to_string())
            .or_default()
            .push(RelocationPlan::new(&record.path, target_dir.join(&file_name)));
    }

    debug!(
        base = %base.display(),
        planned = plan.total(),
        in_place = plan.already_in_place,
        "organize plan ready"
    );
    Ok(plan)
}

/// Organizes `base` according to `settings` and records the run for undo.
///
/// Invalid filters and an invalid base abort before anything moves; failures
/// on individual files are collected in the outcome's report.
pub fn organize(
    base: &Path,
    settings: &Settings,
    options: &OrganizeOptions<'_>,
) -> WardenResult<OrganizeOutcome> {
    let plan = plan_organize(base, settings, options)?;
    Ok(execute_plan(plan, settings.cross_device_fallback, options))
}

/// Executes a previously computed plan.
pub fn execute_plan(
    plan: OrganizePlan,
    allow_copy_delete: bool,
    options: &OrganizeOptions<'_>,
) -> OrganizeOutcome {
    info!(base = %plan.base.display(), files = plan.total(), "organizing");

    let total = plan.total();
    let processed = AtomicUsize::new(0);
    let base = plan.base.clone();

    let per_folder: Vec<(String, BatchReport, Vec<Operation>)> = plan
        .by_folder
        .into_par_iter()
        .map(|(folder, plans)| {
            let mut report = BatchReport::new();
            let mut operations = Vec::with_capacity(plans.len());

            let target_dir = base.join(&folder);
            if let Err(e) = fs::create_dir_all(&target_dir) {
                let err = WardenError::write(&target_dir, e);
                for plan in &plans {
                    report.record_failure(&plan.source, &err);
                }
                return (folder, report, operations);
            }

            for plan in plans {
                if progress::cancelled(options.cancel) {
                    report.cancelled = true;
                    break;
                }
                match plan.execute(allow_copy_delete) {
                    Ok(new_path) => {
                        report.record_success();
                        operations.push(Operation {
                            original_path: plan.source.clone(),
                            new_path,
                            folder: folder.clone(),
                        });
                    }
                    Err(e) => {
                        warn!(path = %plan.source.display(), error = %e, "could not move file");
                        report.record_failure(&plan.source, e);
                    }
                }
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                let label = plan
                    .source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                progress::notify(options.progress, done, total, &label);
            }
            (folder, report, operations)
        })
        .collect();

    let mut report = BatchReport::new();
    report.skipped = plan.already_in_place + plan.unclassified;
    for warning in &plan.warnings {
        report.record_failure(&warning.path, &warning.reason);
    }

    let mut log = OperationLog::new(base.clone(), RunKind::Organize);
    let mut moved_per_folder = BTreeMap::new();
    for (folder, folder_report, operations) in per_folder {
        if folder_report.succeeded > 0 {
            moved_per_folder.insert(folder, folder_report.succeeded);
        }
        report.merge(folder_report);
        for operation in operations {
            log.add_operation(operation);
        }
    }

    // An empty run keeps the previous history so it can still be undone.
    let history_error = if log.operations.is_empty() {
        None
    } else {
        log.save(&base).err()
    };
    if let Some(e) = &history_error {
        warn!(error = %e, "could not save undo history");
    }

    OrganizeOutcome {
        report,
        moved_per_folder,
        log,
        history_error,
    }
}

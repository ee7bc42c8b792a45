//! Duplicate detection by content fingerprint.
//!
//! Records are fingerprinted in parallel on the rayon pool and merged into
//! per-fingerprint buckets on the calling thread afterwards, so no lock is
//! held while hashing. Buckets with at least two members are reported as
//! [`DuplicateGroup`]s.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ScanFilter;
use crate::digest::Fingerprint;
use crate::error::{WardenError, WardenResult};
use crate::progress::{self, BatchReport, CancelToken, ProgressSink};
use crate::walker::{self, FileRecord};

/// Files sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint: Fingerprint,
    pub members: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Size of each member in bytes.
    pub fn size(&self) -> u64 {
        self.members.first().map_or(0, |m| m.size)
    }

    /// Bytes that deleting all but one member would free.
    pub fn wasted_bytes(&self) -> u64 {
        self.size() * (self.members.len().saturating_sub(1) as u64)
    }

    /// The member that is kept when redundant copies are removed: the one
    /// with the lexicographically smallest path.
    pub fn keeper(&self) -> Option<&FileRecord> {
        self.members.iter().min_by(|a, b| a.path.cmp(&b.path))
    }

    /// Every member except the keeper.
    pub fn redundant(&self) -> Vec<&FileRecord> {
        let keeper = self.keeper().map(|k| k.path.as_path());
        self.members
            .iter()
            .filter(|m| Some(m.path.as_path()) != keeper)
            .collect()
    }
}

/// Tuning and hooks for [`group`].
#[derive(Default)]
pub struct GroupOptions<'a> {
    /// Skip hashing files whose size no other file shares.
    pub size_prefilter: bool,
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: Option<&'a CancelToken>,
}

impl GroupOptions<'_> {
    /// Options with the size prefilter on and no hooks.
    pub fn new() -> Self {
        Self {
            size_prefilter: true,
            ..Default::default()
        }
    }
}

/// Result of a grouping run.
#[derive(Debug, Default)]
pub struct GroupOutcome {
    /// Reportable groups, ordered by the path of their first member.
    pub groups: Vec<DuplicateGroup>,
    /// Per-file hashing results; `succeeded` counts hashed files.
    pub report: BatchReport,
}

impl GroupOutcome {
    /// Total bytes held by redundant copies.
    pub fn wasted_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }

    /// Number of files that are copies of some other file.
    pub fn duplicate_files(&self) -> usize {
        self.groups.iter().map(|g| g.members.len() - 1).sum()
    }
}

/// Groups `records` by the fingerprint `hash_of` computes for each.
///
/// A file that fails to hash is recorded in the report and left out; the
/// rest of the batch carries on. Within a group, members keep the order they
/// had in `records`.
pub fn group<H>(records: Vec<FileRecord>, hash_of: H, options: &GroupOptions<'_>) -> GroupOutcome
where
    H: Fn(&Path) -> WardenResult<Fingerprint> + Sync,
{
    let mut report = BatchReport::new();

    let candidates: Vec<FileRecord> = if options.size_prefilter {
        let mut by_size: HashMap<u64, usize> = HashMap::new();
        for record in &records {
            *by_size.entry(record.size).or_insert(0) += 1;
        }
        let before = records.len();
        let kept: Vec<FileRecord> = records
            .into_iter()
            .filter(|r| by_size.get(&r.size).copied().unwrap_or(0) > 1)
            .collect();
        report.skipped += before - kept.len();
        kept
    } else {
        records
    };

    let total = candidates.len();
    let processed = AtomicUsize::new(0);

    // Partition: hash in parallel, keeping input order in the collected vec.
    let hashed: Vec<Option<(FileRecord, WardenResult<Fingerprint>)>> = candidates
        .into_par_iter()
        .map(|record| {
            if progress::cancelled(options.cancel) {
                return None;
            }
            let result = hash_of(&record.path);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            progress::notify(options.progress, done, total, &record.file_name());
            Some((record, result))
        })
        .collect();

    // Merge: insertion-ordered buckets, built on one thread.
    let mut order: Vec<Fingerprint> = Vec::new();
    let mut buckets: HashMap<Fingerprint, Vec<FileRecord>> = HashMap::new();
    for item in hashed {
        let Some((record, result)) = item else {
            report.cancelled = true;
            continue;
        };
        match result {
            Ok(fingerprint) => {
                report.record_success();
                let bucket = buckets.entry(fingerprint.clone()).or_insert_with(|| {
                    order.push(fingerprint);
                    Vec::new()
                });
                bucket.push(record);
            }
            Err(e) => {
                warn!(path = %record.path.display(), error = %e, "could not fingerprint file");
                report.record_failure(&record.path, e);
            }
        }
    }

    let mut groups: Vec<DuplicateGroup> = order
        .into_iter()
        .filter_map(|fingerprint| {
            let members = buckets.remove(&fingerprint)?;
            (members.len() > 1).then_some(DuplicateGroup {
                fingerprint,
                members,
            })
        })
        .collect();
    groups.sort_by(|a, b| a.members[0].path.cmp(&b.members[0].path));

    debug!(
        hashed = report.succeeded,
        failed = report.failed(),
        groups = groups.len(),
        "grouping finished"
    );
    GroupOutcome { groups, report }
}

/// Walks `root`, applies `filter`, and groups the surviving files by SHA-256.
///
/// Walk warnings (unreadable directories) are folded into the report as
/// failures.
pub fn find_duplicates(
    root: &Path,
    filter: &ScanFilter,
    options: &GroupOptions<'_>,
) -> WardenResult<GroupOutcome> {
    let root = walker::validate_root(root)?;
    let (records, warnings) = walker::walk(&root)?.collect_with_warnings();

    let records: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| {
            let relative = r.path.strip_prefix(&root).unwrap_or(&r.path);
            filter.should_include(relative)
        })
        .collect();
    info!(root = %root.display(), files = records.len(), "scanning for duplicates");

    let mut outcome = group(records, crate::digest::digest, options);
    for warning in warnings {
        outcome.report.record_failure(&warning.path, warning.reason);
    }
    Ok(outcome)
}

/// Deletes every redundant member of `groups`, keeping one file per group.
///
/// The keeper is re-fingerprinted first; if it is gone or no longer matches,
/// the whole group is skipped. Each redundant member is then re-checked right
/// before deletion, and a file that changed since the scan is skipped.
pub fn delete_redundant(groups: &[DuplicateGroup], cancel: Option<&CancelToken>) -> BatchReport {
    let mut report = BatchReport::new();
    for group in groups {
        if progress::cancelled(cancel) {
            report.cancelled = true;
            return report;
        }
        let redundant = group.redundant();
        if !keeper_intact(group) {
            warn!(
                fingerprint = %group.fingerprint.as_str(),
                files = redundant.len(),
                "kept copy changed or missing since scan, group left alone"
            );
            for _ in &redundant {
                report.record_skip();
            }
            continue;
        }
        for member in redundant {
            if progress::cancelled(cancel) {
                report.cancelled = true;
                return report;
            }
            match remove_if_unchanged(&member.path, &group.fingerprint) {
                Ok(true) => report.record_success(),
                Ok(false) => {
                    warn!(path = %member.path.display(), "file changed since scan, kept");
                    report.record_skip();
                }
                Err(e) => report.record_failure(&member.path, e),
            }
        }
    }
    report
}

fn keeper_intact(group: &DuplicateGroup) -> bool {
    let Some(keeper) = group.keeper() else {
        return false;
    };
    match crate::digest::digest(&keeper.path) {
        Ok(fingerprint) => fingerprint == group.fingerprint,
        Err(_) => false,
    }
}

fn remove_if_unchanged(path: &Path, expected: &Fingerprint) -> WardenResult<bool> {
    if crate::digest::digest(path)? != *expected {
        return Ok(false);
    }
    fs::remove_file(path).map_err(|e| WardenError::write(path, e))?;
    debug!(path = %path.display(), "removed duplicate");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn record(dir: &Path, name: &str, content: &[u8]) -> FileRecord {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        FileRecord {
            path,
            size: content.len() as u64,
            modified: SystemTime::now(),
        }
    }

    fn member_set(group: &DuplicateGroup) -> HashSet<PathBuf> {
        group.members.iter().map(|m| m.path.clone()).collect()
    }

    #[test]
    fn test_two_identical_one_distinct() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let records = vec![
            record(dir, "a.txt", b"hello"),
            record(dir, "b.txt", b"world"),
            record(dir, "c.txt", b"hello"),
        ];

        let outcome = group(records, digest, &GroupOptions::new());
        assert_eq!(outcome.groups.len(), 1);
        let expected: HashSet<_> = [dir.join("a.txt"), dir.join("c.txt")].into();
        assert_eq!(member_set(&outcome.groups[0]), expected);
        assert_eq!(outcome.duplicate_files(), 1);
        assert_eq!(outcome.wasted_bytes(), 5);
    }

    #[test]
    fn test_prefilter_does_not_change_result() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let make = || {
            vec![
                record(dir, "1", b"aaaa"),
                record(dir, "2", b"aaaa"),
                record(dir, "3", b"bbbb"),
                record(dir, "4", b"unique size"),
                record(dir, "5", b"bbbb"),
            ]
        };

        let with = group(make(), digest, &GroupOptions::new());
        let without = group(
            make(),
            digest,
            &GroupOptions {
                size_prefilter: false,
                ..Default::default()
            },
        );

        let sets = |o: &GroupOutcome| o.groups.iter().map(member_set).collect::<Vec<_>>();
        assert_eq!(sets(&with), sets(&without));
        assert_eq!(with.groups.len(), 2);
        assert_eq!(with.report.skipped, 1);
        assert_eq!(without.report.succeeded, 5);
    }

    #[test]
    fn test_same_size_different_content_not_grouped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let records = vec![record(dir, "x", b"abcd"), record(dir, "y", b"abce")];
        assert!(group(records, digest, &GroupOptions::new()).groups.is_empty());
    }

    #[test]
    fn test_hash_failure_is_isolated() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let mut records = vec![record(dir, "a", b"same"), record(dir, "b", b"same")];
        records.push(FileRecord {
            path: dir.join("vanished"),
            size: 4,
            modified: SystemTime::now(),
        });

        let outcome = group(records, digest, &GroupOptions::new());
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.report.failed(), 1);
        assert_eq!(outcome.report.failures[0].path, dir.join("vanished"));
    }

    #[test]
    fn test_custom_hash_function_and_progress() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let records = vec![
            record(dir, "a", b"1"),
            record(dir, "b", b"2"),
            record(dir, "c", b"3"),
        ];

        let calls = AtomicUsize::new(0);
        let sink = |_: usize, total: usize, _: &str| {
            assert_eq!(total, 3);
            calls.fetch_add(1, Ordering::Relaxed);
        };
        let options = GroupOptions {
            size_prefilter: true,
            progress: Some(&sink),
            cancel: None,
        };
        // Everything hashes to one bucket, so all three group together.
        let constant = |_: &Path| -> WardenResult<Fingerprint> { digest_of_nothing() };
        let outcome = group(records, constant, &options);

        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].members.len(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    fn digest_of_nothing() -> WardenResult<Fingerprint> {
        Ok(crate::digest::digest_reader(std::io::empty()).unwrap())
    }

    #[test]
    fn test_cancelled_before_start_hashes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let records = vec![record(dir, "a", b"z"), record(dir, "b", b"z")];
        let token = CancelToken::new();
        token.cancel();

        let options = GroupOptions {
            cancel: Some(&token),
            ..GroupOptions::new()
        };
        let outcome = group(records, digest, &options);
        assert!(outcome.report.cancelled);
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.report.succeeded, 0);
    }

    #[test]
    fn test_find_duplicates_walks_tree_and_applies_filter() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        record(dir, "one.txt", b"dup");
        record(dir, "nested/two.txt", b"dup");
        record(dir, ".hidden", b"dup");
        record(dir, "other.txt", b"not");

        let filter = crate::config::FilterRules::default().compile().unwrap();
        let outcome = find_duplicates(dir, &filter, &GroupOptions::new()).unwrap();
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].members.len(), 2);

        let outcome = find_duplicates(dir, &ScanFilter::allow_all(), &GroupOptions::new()).unwrap();
        assert_eq!(outcome.groups[0].members.len(), 3);
    }

    #[test]
    fn test_find_duplicates_invalid_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = find_duplicates(
            &temp_dir.path().join("nope"),
            &ScanFilter::allow_all(),
            &GroupOptions::new(),
        );
        assert!(matches!(result, Err(WardenError::InvalidRoot { .. })));
    }

    #[test]
    fn test_keeper_and_redundant() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let outcome = group(
            vec![
                record(dir, "b.txt", b"x"),
                record(dir, "a.txt", b"x"),
                record(dir, "c.txt", b"x"),
            ],
            digest,
            &GroupOptions::new(),
        );
        let g = &outcome.groups[0];
        assert_eq!(g.keeper().unwrap().path, dir.join("a.txt"));
        let redundant: HashSet<_> = g.redundant().iter().map(|r| r.path.clone()).collect();
        assert_eq!(redundant, [dir.join("b.txt"), dir.join("c.txt")].into());
    }

    #[test]
    fn test_delete_redundant_keeps_one_copy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let outcome = group(
            vec![
                record(dir, "a.txt", b"copy"),
                record(dir, "b.txt", b"copy"),
                record(dir, "c.txt", b"copy"),
            ],
            digest,
            &GroupOptions::new(),
        );

        // Change c.txt after the scan: it must survive.
        fs::write(dir.join("c.txt"), b"edit").unwrap();

        let report = delete_redundant(&outcome.groups, None);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);
        assert!(dir.join("a.txt").exists());
        assert!(!dir.join("b.txt").exists());
        assert!(dir.join("c.txt").exists());
    }

    #[test]
    fn test_delete_redundant_skips_group_when_keeper_changed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let outcome = group(
            vec![record(dir, "a.txt", b"precious"), record(dir, "b.txt", b"precious")],
            digest,
            &GroupOptions::new(),
        );
        assert_eq!(outcome.groups[0].keeper().unwrap().path, dir.join("a.txt"));

        // The copy that would be kept is edited after the scan.
        fs::write(dir.join("a.txt"), b"rewritten").unwrap();

        let report = delete_redundant(&outcome.groups, None);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(fs::read(dir.join("b.txt")).unwrap(), b"precious");
    }

    #[test]
    fn test_delete_redundant_skips_group_when_keeper_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        let outcome = group(
            vec![
                record(dir, "a.txt", b"only"),
                record(dir, "b.txt", b"only"),
                record(dir, "c.txt", b"only"),
                record(dir, "x/d.txt", b"other"),
                record(dir, "x/e.txt", b"other"),
            ],
            digest,
            &GroupOptions::new(),
        );
        fs::remove_file(dir.join("a.txt")).unwrap();

        let report = delete_redundant(&outcome.groups, None);
        // Only the untouched group loses its duplicate.
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 2);
        assert!(dir.join("b.txt").exists());
        assert!(dir.join("c.txt").exists());
        assert!(dir.join("x/d.txt").exists());
        assert!(!dir.join("x/e.txt").exists());
    }
}

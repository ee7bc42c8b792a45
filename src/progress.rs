//! Batch plumbing shared by every long-running operation: progress
//! reporting, cooperative cancellation and the per-batch summary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;

/// Receives `(processed, total, label)` updates from a running batch.
///
/// Implementations must be cheap; they are called once per file, possibly
/// from several worker threads at once.
pub trait ProgressSink: Sync {
    fn report(&self, processed: usize, total: usize, label: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &str) + Sync,
{
    fn report(&self, processed: usize, total: usize, label: &str) {
        self(processed, total, label)
    }
}

impl ProgressSink for ProgressBar {
    fn report(&self, processed: usize, total: usize, label: &str) {
        self.set_length(total as u64);
        self.set_position(processed as u64);
        self.set_message(label.to_string());
    }
}

/// Forwards to an optional sink.
pub(crate) fn notify(sink: Option<&dyn ProgressSink>, processed: usize, total: usize, label: &str) {
    if let Some(sink) = sink {
        sink.report(processed, total, label);
    }
}

/// Shared cancellation flag, honored between files only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Work already in flight on a file completes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Checks an optional token.
pub(crate) fn cancelled(token: Option<&CancelToken>) -> bool {
    token.is_some_and(CancelToken::is_cancelled)
}

/// A single item that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary every batch operation completes with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items processed successfully.
    pub succeeded: usize,
    /// Items deliberately left alone (already in place, unchanged).
    pub skipped: usize,
    /// Items that failed, with the reason.
    pub failures: Vec<Failure>,
    /// True if the batch stopped early because of a cancellation request.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, path: &Path, reason: impl ToString) {
        self.failures.push(Failure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }
}

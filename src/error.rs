//! Error taxonomy shared by every filewarden operation.
//!
//! Per-file failures inside a batch are captured in a
//! [`BatchReport`](crate::progress::BatchReport) instead of being returned;
//! the variants here abort a whole operation only when they occur before any
//! mutation starts (invalid root, unusable configuration).

use std::io;
use std::path::{Path, PathBuf};

/// What went wrong at the I/O level for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCause {
    /// Reading the path failed.
    Read,
    /// Writing, creating, renaming or removing the path failed.
    Write,
    /// The OS refused access.
    Permission,
    /// The path does not exist (or vanished mid-operation).
    Missing,
}

impl std::fmt::Display for IoCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IoCause::Read => "read failed",
            IoCause::Write => "write failed",
            IoCause::Permission => "permission denied",
            IoCause::Missing => "not found",
        };
        f.write_str(label)
    }
}

/// Errors produced by the filewarden engine.
#[derive(Debug)]
pub enum WardenError {
    /// An I/O operation on a specific path failed.
    IoFailure {
        path: PathBuf,
        cause: IoCause,
        source: io::Error,
    },
    /// A move would have crossed a filesystem boundary, so it cannot be atomic.
    AtomicityUnavailable {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The directory an operation targets is missing or not a directory.
    InvalidRoot { path: PathBuf, reason: String },
    /// The settings document could not be read, parsed or written.
    Configuration { path: PathBuf, reason: String },
    /// A classification rule or filter pattern was rejected.
    InvalidRule { reason: String },
}

impl WardenError {
    /// Wraps an `io::Error` raised while reading `path`.
    pub fn read(path: &Path, err: io::Error) -> Self {
        Self::io(path, IoCause::Read, err)
    }

    /// Wraps an `io::Error` raised while writing `path`.
    pub fn write(path: &Path, err: io::Error) -> Self {
        Self::io(path, IoCause::Write, err)
    }

    fn io(path: &Path, fallback: IoCause, err: io::Error) -> Self {
        let cause = match err.kind() {
            io::ErrorKind::PermissionDenied => IoCause::Permission,
            io::ErrorKind::NotFound => IoCause::Missing,
            _ => fallback,
        };
        Self::IoFailure {
            path: path.to_path_buf(),
            cause,
            source: err,
        }
    }

    /// Builds an `InvalidRoot` error.
    pub fn invalid_root(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// The path the error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::IoFailure { path, .. }
            | Self::InvalidRoot { path, .. }
            | Self::Configuration { path, .. } => Some(path),
            Self::AtomicityUnavailable { source, .. } => Some(source),
            Self::InvalidRule { .. } => None,
        }
    }
}

impl std::fmt::Display for WardenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoFailure {
                path,
                cause,
                source,
            } => write!(f, "{} ({}): {}", path.display(), cause, source),
            Self::AtomicityUnavailable {
                source,
                destination,
            } => write!(
                f,
                "Cannot move {} to {} atomically: paths are on different filesystems",
                source.display(),
                destination.display()
            ),
            Self::InvalidRoot { path, reason } => {
                write!(f, "Invalid directory {}: {}", path.display(), reason)
            }
            Self::Configuration { path, reason } => {
                write!(f, "Configuration error in {}: {}", path.display(), reason)
            }
            Self::InvalidRule { reason } => write!(f, "Invalid rule: {}", reason),
        }
    }
}

impl std::error::Error for WardenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for filewarden operations.
pub type WardenResult<T> = Result<T, WardenError>;

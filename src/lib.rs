//! filewarden - collision-safe organizing, renaming, deduplication and backup
//!
//! The engine is built from a few small pieces: [`walker`] lists regular
//! files deterministically, [`digest`] fingerprints them with SHA-256,
//! [`duplicates`] groups identical content, [`relocation`] moves and copies
//! without ever overwriting, and [`classification`] maps extensions to
//! folders. The feature modules ([`organizer`], [`renamer`], [`backup`],
//! [`schedule`], [`undo`]) are built on top of them, and [`cli`] drives
//! everything from the command line.

pub mod backup;
pub mod classification;
pub mod cli;
pub mod config;
pub mod digest;
pub mod duplicates;
pub mod error;
pub mod organizer;
pub mod output;
pub mod progress;
pub mod relocation;
pub mod renamer;
pub mod schedule;
pub mod undo;
pub mod walker;

pub use classification::{ClassificationRules, classify};
pub use config::{FilterRules, ScanFilter, Settings, SettingsStore};
pub use digest::{Fingerprint, digest};
pub use duplicates::{DuplicateGroup, GroupOptions, GroupOutcome, find_duplicates, group};
pub use error::{WardenError, WardenResult};
pub use progress::{BatchReport, CancelToken, ProgressSink};
pub use relocation::{RelocationMode, RelocationPlan, relocate, relocate_with_fallback};
pub use undo::{OperationLog, UndoManager};
pub use walker::{FileRecord, walk};

pub use cli::{Cli, run_cli};

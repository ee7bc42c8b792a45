//! Settings persistence and scan filtering.
//!
//! Settings live in a single JSON document. Every field is optional on disk
//! and falls back to its default, so older or hand-edited files keep working.
//!
//! # Settings File Format
//!
//! ```json
//! {
//!   "categoryMap": { "jpg": "Pictures", "pdf": "Docs", "*": "Misc" },
//!   "backupEnabled": false,
//!   "backupSource": "/home/me/Documents",
//!   "backupTarget": "/media/usb/backup",
//!   "backupHour": 20,
//!   "backupMinute": 0,
//!   "crossDeviceFallback": true,
//!   "filters": {
//!     "hiddenFiles": false,
//!     "excludeNames": ["Thumbs.db"],
//!     "excludeExtensions": ["tmp"],
//!     "excludeGlobs": ["node_modules/**"],
//!     "excludeRegex": [],
//!     "includeGlobs": []
//!   }
//! }
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::classification::ClassificationRules;
use crate::error::{WardenError, WardenResult};

/// Everything filewarden reads from the settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Extension → folder rules used by the organizer.
    pub category_map: ClassificationRules,
    /// Whether the daily backup should run.
    pub backup_enabled: bool,
    /// Directory the backup copies from.
    pub backup_source: String,
    /// Directory the backup copies into.
    pub backup_target: String,
    /// Hour of day (0-23) for the daily backup.
    pub backup_hour: u32,
    /// Minute (0-59) for the daily backup.
    pub backup_minute: u32,
    /// Retry a cross-filesystem move as copy + delete instead of failing.
    pub cross_device_fallback: bool,
    /// Exclusion rules for organize and duplicate scans.
    pub filters: FilterRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            category_map: ClassificationRules::default(),
            backup_enabled: false,
            backup_source: String::new(),
            backup_target: String::new(),
            backup_hour: 20,
            backup_minute: 0,
            cross_device_fallback: true,
            filters: FilterRules::default(),
        }
    }
}

impl Settings {
    /// Backup source and target, if both are configured.
    pub fn backup_paths(&self) -> Option<(PathBuf, PathBuf)> {
        let source = self.backup_source.trim();
        let target = self.backup_target.trim();
        if source.is_empty() || target.is_empty() {
            return None;
        }
        Some((PathBuf::from(source), PathBuf::from(target)))
    }
}

/// Loads and saves [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `path` if given, otherwise at [`SettingsStore::default_path`].
    pub fn locate(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::new(path),
            None => Self::new(Self::default_path()),
        }
    }

    /// `~/.config/filewarden/settings.json`, or a file in the working
    /// directory when no home directory is known.
    pub fn default_path() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home)
                .join(".config")
                .join("filewarden")
                .join("settings.json"),
            None => PathBuf::from(".filewarden.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the settings file.
    ///
    /// Returns `Ok(None)` if there is no file yet.
    ///
    /// # Errors
    ///
    /// Returns `WardenError::Configuration` if the file exists but cannot be
    /// read or is not a valid settings document.
    pub fn try_load(&self) -> WardenResult<Option<Settings>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WardenError::Configuration {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let settings: Settings =
            serde_json::from_str(&content).map_err(|e| WardenError::Configuration {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        settings.validate(&self.path)?;
        Ok(Some(settings))
    }

    /// Loads settings, falling back to defaults.
    ///
    /// A missing file yields defaults silently; an unreadable or corrupt one
    /// yields defaults and the error that caused the fallback, so the caller
    /// can tell the user without aborting the operation.
    pub fn load(&self) -> (Settings, Option<WardenError>) {
        match self.try_load() {
            Ok(Some(settings)) => {
                debug!(path = %self.path.display(), "loaded settings");
                (settings, None)
            }
            Ok(None) => (Settings::default(), None),
            Err(e) => {
                warn!(error = %e, "settings unusable, falling back to defaults");
                (Settings::default(), Some(e))
            }
        }
    }

    /// Writes `settings` as pretty JSON, replacing the file atomically.
    pub fn save(&self, settings: &Settings) -> WardenResult<()> {
        let to_config_error = |reason: String| WardenError::Configuration {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| to_config_error(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| to_config_error(format!("JSON serialization failed: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| to_config_error(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            to_config_error(e.to_string())
        })?;
        debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }

    /// Adds a classification rule and persists the result.
    ///
    /// The in-memory change is kept even if persisting fails.
    pub fn add_rule(&self, settings: &mut Settings, extension: &str, folder: &str) -> WardenResult<()> {
        settings.category_map.add_rule(extension, folder)?;
        self.save(settings)
    }

    /// Removes a classification rule and persists the result.
    ///
    /// Returns the folder the rule pointed at, or `None` if there was no such
    /// rule (nothing is written in that case).
    pub fn remove_rule(&self, settings: &mut Settings, extension: &str) -> WardenResult<Option<String>> {
        let removed = settings.category_map.remove_rule(extension);
        if removed.is_some() {
            self.save(settings)?;
        }
        Ok(removed)
    }
}

impl Settings {
    fn validate(&self, path: &Path) -> WardenResult<()> {
        if self.backup_hour > 23 || self.backup_minute > 59 {
            return Err(WardenError::Configuration {
                path: path.to_path_buf(),
                reason: format!(
                    "backup time {:02}:{:02} is not a valid time of day",
                    self.backup_hour, self.backup_minute
                ),
            });
        }
        Ok(())
    }
}

/// Exclusion rules applied while scanning for organize and duplicate runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterRules {
    /// Whether hidden entries are scanned. A file is hidden when its name, or
    /// the name of any directory above it, starts with ".".
    pub hidden_files: bool,
    /// Exact file names to skip (e.g. "Thumbs.db").
    pub exclude_names: Vec<String>,
    /// Extensions to skip, case-insensitive, without the dot.
    pub exclude_extensions: Vec<String>,
    /// Glob patterns, matched against the path relative to the scan root.
    pub exclude_globs: Vec<String>,
    /// Regular expressions, matched against the file name.
    pub exclude_regex: Vec<String>,
    /// Glob patterns that force inclusion regardless of the rules above.
    pub include_globs: Vec<String>,
}

impl FilterRules {
    /// Compiles patterns once so matching does not re-parse them per file.
    ///
    /// # Errors
    ///
    /// Returns `WardenError::InvalidRule` naming the first bad glob or regex.
    pub fn compile(&self) -> WardenResult<ScanFilter> {
        let globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| WardenError::InvalidRule {
                        reason: format!("glob '{}': {}", p, e),
                    })
                })
                .collect::<WardenResult<Vec<_>>>()
        };

        let exclude_regex = self
            .exclude_regex
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| WardenError::InvalidRule {
                    reason: format!("regex '{}': {}", p, e),
                })
            })
            .collect::<WardenResult<Vec<_>>>()?;

        Ok(ScanFilter {
            hidden_files: self.hidden_files,
            exclude_names: self.exclude_names.iter().cloned().collect(),
            exclude_extensions: self
                .exclude_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_globs: globs(&self.exclude_globs)?,
            exclude_regex,
            include_globs: globs(&self.include_globs)?,
        })
    }
}

/// Compiled form of [`FilterRules`].
#[derive(Debug, Clone)]
pub struct ScanFilter {
    hidden_files: bool,
    exclude_names: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_globs: Vec<Pattern>,
    exclude_regex: Vec<Regex>,
    include_globs: Vec<Pattern>,
}

impl ScanFilter {
    /// A filter that lets every file through.
    pub fn allow_all() -> Self {
        Self {
            hidden_files: true,
            exclude_names: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_globs: Vec::new(),
            exclude_regex: Vec::new(),
            include_globs: Vec::new(),
        }
    }

    /// Decides whether `relative` (a path relative to the scan root) is scanned.
    ///
    /// Include globs win; then hidden files, names, extensions, globs and
    /// regexes are checked in that order.
    pub fn should_include(&self, relative: &Path) -> bool {
        if self.include_globs.iter().any(|p| p.matches_path(relative)) {
            return true;
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.hidden_files && is_hidden(relative) {
            return false;
        }
        if self.exclude_names.contains(file_name.as_ref()) {
            return false;
        }
        if let Some(ext) = relative.extension()
            && self
                .exclude_extensions
                .contains(&ext.to_string_lossy().to_lowercase())
        {
            return false;
        }
        if self.exclude_globs.iter().any(|p| p.matches_path(relative)) {
            return false;
        }
        !self.exclude_regex.iter().any(|r| r.is_match(&file_name))
    }
}

/// True if any component of `relative` is a dot-name such as `.git`.
fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

//! Extension-based classification of files into destination subfolders.
//!
//! Rules map a lowercase extension (without the leading dot) to a folder
//! name. The reserved key `"*"` catches every extension that has no rule of
//! its own; with no wildcard, unmatched files have no destination and are left
//! where they are.
//!
//! # Examples
//!
//! ```
//! use filewarden::classification::{ClassificationRules, classify};
//!
//! let rules = ClassificationRules::from_pairs([("jpg", "Pictures"), ("*", "Misc")]);
//! assert_eq!(classify("photo.JPG", &rules), Some("Pictures"));
//! assert_eq!(classify("data.xyz", &rules), Some("Misc"));
//! assert_eq!(classify("noext", &ClassificationRules::empty()), None);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{WardenError, WardenResult};

/// Key that matches any extension without an explicit rule.
pub const WILDCARD: &str = "*";

/// Extensions eligible for bulk image renaming.
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "gif", "bmp", "heic", "webp", "tif", "tiff",
];

/// Mapping from extension to destination subfolder.
///
/// Keys are normalized on insert, so one extension can only ever have one
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ClassificationRules {
    rules: BTreeMap<String, String>,
}

impl ClassificationRules {
    /// A rule set with no rules at all.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Builds a rule set from `(extension, folder)` pairs, normalizing keys.
    /// Pairs [`add_rule`](Self::add_rule) rejects are dropped with a warning.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut rules = Self::empty();
        for (ext, folder) in pairs {
            if let Err(e) = rules.add_rule(ext.as_ref(), folder.as_ref()) {
                warn!(
                    extension = ext.as_ref(),
                    folder = folder.as_ref(),
                    error = %e,
                    "ignoring invalid classification rule"
                );
            }
        }
        rules
    }

    /// Adds or replaces the rule for `extension`.
    ///
    /// The extension is trimmed, stripped of leading dots and lowercased.
    pub fn add_rule(&mut self, extension: &str, folder: &str) -> WardenResult<()> {
        let key = normalize_extension(extension);
        let folder = folder.trim();
        if key.is_empty() {
            return Err(WardenError::InvalidRule {
                reason: format!("extension '{}' is empty", extension),
            });
        }
        if folder.is_empty() {
            return Err(WardenError::InvalidRule {
                reason: format!("no destination folder given for '{}'", key),
            });
        }
        if folder.contains(['/', '\\']) || folder == "." || folder == ".." {
            return Err(WardenError::InvalidRule {
                reason: format!("destination '{}' must be a plain folder name", folder),
            });
        }
        self.rules.insert(key, folder.to_string());
        Ok(())
    }

    /// Removes the rule for `extension`, returning its folder if one existed.
    pub fn remove_rule(&mut self, extension: &str) -> Option<String> {
        self.rules.remove(&normalize_extension(extension))
    }

    /// Looks up a lowercase extension, falling back to the wildcard.
    pub fn destination_for(&self, extension: &str) -> Option<&str> {
        self.rules
            .get(extension)
            .or_else(|| self.rules.get(WILDCARD))
            .map(String::as_str)
    }

    /// Every distinct destination folder.
    pub fn folders(&self) -> Vec<&str> {
        let mut folders: Vec<&str> = self.rules.values().map(String::as_str).collect();
        folders.sort_unstable();
        folders.dedup();
        folders
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self::from_pairs([
            ("jpg", "Pictures"),
            ("jpeg", "Pictures"),
            ("png", "Pictures"),
            ("gif", "Pictures"),
            ("mp4", "Videos"),
            ("mov", "Videos"),
            ("mkv", "Videos"),
            ("pdf", "Docs"),
            ("docx", "Docs"),
            ("xlsx", "Docs"),
            ("zip", "Archives"),
            ("rar", "Archives"),
            (WILDCARD, "Misc"),
        ])
    }
}

/// Strict conversion used when reading settings: the first invalid entry
/// fails the whole map.
impl TryFrom<BTreeMap<String, String>> for ClassificationRules {
    type Error = WardenError;

    fn try_from(map: BTreeMap<String, String>) -> WardenResult<Self> {
        let mut rules = Self::empty();
        for (ext, folder) in &map {
            rules.add_rule(ext, folder)?;
        }
        Ok(rules)
    }
}

impl From<ClassificationRules> for BTreeMap<String, String> {
    fn from(rules: ClassificationRules) -> Self {
        rules.rules
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// The extension of `filename`: everything after the last `.`, or empty.
///
/// A dot-file counts as all extension, so `.bashrc` classifies under
/// `"bashrc"`. Collision naming treats the same name the other way round:
/// [`unique_destination`](crate::relocation::unique_destination) keeps a
/// dot-file whole and appends the suffix (`.profile` becomes `.profile_1`),
/// so the renamed file stays hidden.
pub fn extension_of(filename: &str) -> &str {
    filename
        .rfind('.')
        .map(|i| &filename[i + 1..])
        .unwrap_or("")
}

/// Chooses the destination subfolder for `filename`, if any.
pub fn classify<'r>(filename: &str, rules: &'r ClassificationRules) -> Option<&'r str> {
    rules.destination_for(&extension_of(filename).to_lowercase())
}

/// True if `extension` names an image format the renamer handles.
pub fn is_image_extension(extension: &str) -> bool {
    let ext = extension.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

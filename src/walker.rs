//! Directory walking.
//!
//! [`walk`] validates the root up front and returns a lazy [`Walk`] iterator
//! of [`FileRecord`]s. Symlinks are never followed nor yielded, entries are
//! visited in file-name order so a fixed tree always walks the same way, and
//! unreadable subdirectories are skipped with a recorded warning.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{WardenError, WardenResult};

/// Snapshot of a regular file taken at walk time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl FileRecord {
    /// Takes a snapshot of a single path, without following symlinks.
    pub fn from_path(path: &Path) -> WardenResult<Self> {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| WardenError::read(path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| WardenError::read(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified,
        })
    }

    /// The file name as a lossy string.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Something the walk had to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// Lazy sequence of regular files under a root.
///
/// Produced once by [`walk`]; it is not restartable.
pub struct Walk {
    inner: walkdir::IntoIter,
    warnings: Vec<WalkWarning>,
}

impl Walk {
    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[WalkWarning] {
        &self.warnings
    }

    /// Drains the walk, returning every record plus the warnings it produced.
    pub fn collect_with_warnings(mut self) -> (Vec<FileRecord>, Vec<WalkWarning>) {
        let records: Vec<FileRecord> = self.by_ref().collect();
        (records, self.warnings)
    }

    fn record_warning(&mut self, path: PathBuf, reason: String) {
        warn!(path = %path.display(), %reason, "skipping unreadable entry");
        self.warnings.push(WalkWarning { path, reason });
    }
}

impl Iterator for Walk {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    self.record_warning(path, err.to_string());
                    continue;
                }
            };

            // Symlinks report their own type because links are not followed.
            if !entry.file_type().is_file() {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    return Some(FileRecord {
                        path: entry.into_path(),
                        size: metadata.len(),
                        modified,
                    });
                }
                Err(err) => {
                    self.record_warning(entry.into_path(), err.to_string());
                }
            }
        }
    }
}

/// Walks every regular file under `root`, recursively.
pub fn walk(root: &Path) -> WardenResult<Walk> {
    walk_with_depth(root, None)
}

/// Like [`walk`], limited to `max_depth` levels (1 = the root's own files).
pub fn walk_with_depth(root: &Path, max_depth: Option<usize>) -> WardenResult<Walk> {
    let root = validate_root(root)?;

    let mut walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    Ok(Walk {
        inner: walker.into_iter(),
        warnings: Vec::new(),
    })
}

/// Ensures `root` is an existing directory and returns it in absolute form.
pub fn validate_root(root: &Path) -> WardenResult<PathBuf> {
    match std::fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(WardenError::invalid_root(root, "not a directory")),
        Err(e) => return Err(WardenError::invalid_root(root, e.to_string())),
    }
    std::path::absolute(root).map_err(|e| WardenError::invalid_root(root, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(records: &[FileRecord], root: &Path) -> Vec<String> {
        records
            .iter()
            .map(|r| {
                r.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_walk_is_recursive_and_ordered() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::write(root.join("c.txt"), "c").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b/nested/d.txt"), "dd").unwrap();

        let records: Vec<_> = walk(root).unwrap().collect();
        let root = std::path::absolute(root).unwrap();
        assert_eq!(names(&records, &root), vec!["a.txt", "b/nested/d.txt", "c.txt"]);
        assert!(records.iter().all(|r| r.path.is_absolute()));
        assert_eq!(records[1].size, 2);
    }

    #[test]
    fn test_walk_same_tree_twice_gives_same_order() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for name in ["z.bin", "m.bin", "a.bin", "k.bin"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        let first: Vec<_> = walk(temp_dir.path()).unwrap().map(|r| r.path).collect();
        let second: Vec<_> = walk(temp_dir.path()).unwrap().map(|r| r.path).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_depth_one_stays_in_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("top.txt"), "t").unwrap();
        fs::write(root.join("sub/deep.txt"), "d").unwrap();

        let records: Vec<_> = walk_with_depth(root, Some(1)).unwrap().collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].path.ends_with("top.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_yielded() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("dir")).unwrap();
        fs::write(root.join("one.txt"), "1").unwrap();
        fs::write(root.join("dir/two.txt"), "2").unwrap();
        symlink(root.join("one.txt"), root.join("link_to_file")).unwrap();
        symlink(root.join("dir"), root.join("link_to_dir")).unwrap();
        symlink(root, root.join("dir/loop")).unwrap();

        let records: Vec<_> = walk(root).unwrap().collect();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_root_is_invalid_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = walk(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(WardenError::InvalidRoot { .. })));
    }

    #[test]
    fn test_file_root_is_invalid_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(walk(&file), Err(WardenError::InvalidRoot { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_skipped_with_warning() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let locked = root.join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("secret.txt"), "s").unwrap();
        fs::write(root.join("open.txt"), "o").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to assert in that case.
        let readable_anyway = fs::read_dir(&locked).is_ok();

        let (records, warnings) = walk(root).unwrap().collect_with_warnings();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable_anyway {
            assert_eq!(records.len(), 1);
            assert_eq!(warnings.len(), 1);
        }
    }
}

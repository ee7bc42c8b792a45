/// Collision-safe file relocation.
///
/// This module moves or copies a single file to a desired destination. When
/// the destination is taken, the lowest free `_N` suffix is inserted before
/// the extension (`photo.jpg` → `photo_1.jpg` → `photo_2.jpg` …), so nothing
/// is ever overwritten unless the caller explicitly asks for replacement.
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::error::{WardenError, WardenResult};

/// How a file is relocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationMode {
    /// Atomic rename. Fails with `AtomicityUnavailable` across filesystems.
    Move,
    /// Attribute-preserving copy.
    Copy {
        /// Overwrite the desired destination instead of picking a free name.
        replace: bool,
    },
}

/// A source file and where it is meant to go.
///
/// The destination is resolved against the filesystem only when the plan is
/// executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationPlan {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl RelocationPlan {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Moves the file, retrying as copy + delete across filesystems when allowed.
    pub fn execute(&self, allow_copy_delete: bool) -> WardenResult<PathBuf> {
        relocate_with_fallback(&self.source, &self.destination, allow_copy_delete)
    }
}

/// Returns `desired` if it is free, otherwise the first free `_N` variant.
///
/// The suffix goes before the last `.` of the file name. Names without an
/// extension, and dot-files such as `.profile`, get the suffix at the end.
/// Classification still reads `.profile` as extension `profile`; see
/// [`extension_of`](crate::classification::extension_of).
pub fn unique_destination(desired: &Path) -> PathBuf {
    if !exists(desired) {
        return desired.to_path_buf();
    }

    let file_name = desired
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name.split_at(dot),
        _ => (file_name.as_str(), ""),
    };
    let parent = desired.parent().unwrap_or_else(|| Path::new(""));

    let mut n: u64 = 1;
    loop {
        let candidate = parent.join(format!("{}_{}{}", stem, n, ext));
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Like `Path::exists`, but a dangling symlink still counts as taken.
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Relocates `source` to `desired` (or a free variant of it) and returns the
/// path the file ended up at.
///
/// Parent directories of the destination are created as needed.
///
/// # Errors
///
/// * `IoFailure` if the source is missing, a directory cannot be created or
///   the transfer fails.
/// * `AtomicityUnavailable` if a `Move` would cross filesystems. No data is
///   touched in that case; see [`relocate_with_fallback`].
pub fn relocate(source: &Path, desired: &Path, mode: RelocationMode) -> WardenResult<PathBuf> {
    let metadata = fs::metadata(source).map_err(|e| WardenError::read(source, e))?;
    if !metadata.is_file() {
        return Err(WardenError::read(
            source,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    let destination = match mode {
        RelocationMode::Copy { replace: true } => desired.to_path_buf(),
        _ => unique_destination(desired),
    };

    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| WardenError::write(parent, e))?;
    }

    match mode {
        RelocationMode::Move => match fs::rename(source, &destination) {
            Ok(()) => {}
            Err(e) if is_cross_device_error(&e) => {
                return Err(WardenError::AtomicityUnavailable {
                    source: source.to_path_buf(),
                    destination,
                });
            }
            Err(e) => return Err(WardenError::write(&destination, e)),
        },
        RelocationMode::Copy { .. } => copy_preserving(source, &destination)?,
    }

    debug!(
        from = %source.display(),
        to = %destination.display(),
        ?mode,
        "relocated file"
    );
    Ok(destination)
}

/// Moves `source` to a free variant of `desired`.
///
/// If the move cannot be atomic and `allow_copy_delete` is set, the file is
/// copied instead and the source removed only after the copy has been fully
/// written. Otherwise the `AtomicityUnavailable` error is returned as is.
pub fn relocate_with_fallback(
    source: &Path,
    desired: &Path,
    allow_copy_delete: bool,
) -> WardenResult<PathBuf> {
    match relocate(source, desired, RelocationMode::Move) {
        Err(WardenError::AtomicityUnavailable { .. }) if allow_copy_delete => {
            info!(
                from = %source.display(),
                "cross-filesystem move, falling back to copy + delete"
            );
            let destination = relocate(source, desired, RelocationMode::Copy { replace: false })?;
            fs::remove_file(source).map_err(|e| WardenError::write(source, e))?;
            Ok(destination)
        }
        other => other,
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Copies `source` to `destination` through a temporary sibling, so the
/// destination path only ever holds a complete file. Permissions and
/// access/modification times are carried over.
///
/// Times are set through the handle that wrote the bytes and permissions are
/// applied last, so a read-only source still copies.
fn copy_preserving(source: &Path, destination: &Path) -> WardenResult<()> {
    let mut input = File::open(source).map_err(|e| WardenError::read(source, e))?;
    let metadata = input.metadata().map_err(|e| WardenError::read(source, e))?;
    let tmp = temp_sibling(destination);

    let result = (|| -> WardenResult<()> {
        let mut output = File::options()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| WardenError::write(&tmp, e))?;
        io::copy(&mut input, &mut output).map_err(|e| WardenError::write(&tmp, e))?;

        let mut times = FileTimes::new();
        if let Ok(modified) = metadata.modified() {
            times = times.set_modified(modified);
        }
        if let Ok(accessed) = metadata.accessed() {
            times = times.set_accessed(accessed);
        }
        output
            .set_times(times)
            .map_err(|e| WardenError::write(&tmp, e))?;
        drop(output);

        fs::set_permissions(&tmp, metadata.permissions())
            .map_err(|e| WardenError::write(&tmp, e))?;
        fs::rename(&tmp, destination).map_err(|e| WardenError::write(destination, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(".{}.fw-partial-{}-{}", name, std::process::id(), n);
    match destination.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// True for the OS errors that mean "rename across devices".
pub(crate) fn is_cross_device_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::CrossesDevices {
        return true;
    }
    match err.raw_os_error() {
        Some(18) if cfg!(unix) => true,    // EXDEV
        Some(17) if cfg!(windows) => true, // ERROR_NOT_SAME_DEVICE
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).expect("Failed to write test file");
    }

    #[test]
    fn test_unique_destination_free_path_is_unchanged() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let desired = temp_dir.path().join("a.txt");
        assert_eq!(unique_destination(&desired), desired);
    }

    #[test]
    fn test_unique_destination_picks_lowest_free_suffix() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        write(&dir.join("photo.jpg"), "0");
        write(&dir.join("photo_1.jpg"), "1");
        write(&dir.join("photo_3.jpg"), "3");

        assert_eq!(unique_destination(&dir.join("photo.jpg")), dir.join("photo_2.jpg"));
    }

    #[test]
    fn test_unique_destination_suffix_placement() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        for name in ["README", "archive.tar.gz", ".profile"] {
            write(&dir.join(name), "x");
        }
        assert_eq!(unique_destination(&dir.join("README")), dir.join("README_1"));
        assert_eq!(
            unique_destination(&dir.join("archive.tar.gz")),
            dir.join("archive.tar_1.gz")
        );
        assert_eq!(unique_destination(&dir.join(".profile")), dir.join(".profile_1"));
    }

    #[test]
    fn test_move_creates_parent_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("report.pdf");
        write(&src, "pdf");

        let desired = temp_dir.path().join("Docs/2024/report.pdf");
        let final_path = relocate(&src, &desired, RelocationMode::Move).unwrap();

        assert_eq!(final_path, desired);
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "pdf");
    }

    #[test]
    fn test_two_moves_to_same_destination_never_overwrite() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        write(&a, "content A");
        write(&b, "content B");

        let x = temp_dir.path().join("out/x.txt");
        let first = relocate(&a, &x, RelocationMode::Move).unwrap();
        let second = relocate(&b, &x, RelocationMode::Move).unwrap();

        assert_eq!(first, x);
        assert_eq!(second, temp_dir.path().join("out/x_1.txt"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "content A");
        assert_eq!(fs::read_to_string(&second).unwrap(), "content B");
    }

    #[test]
    fn test_copy_without_replace_keeps_existing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        write(&src, "new");
        write(&dst, "old");

        let final_path = relocate(&src, &dst, RelocationMode::Copy { replace: false }).unwrap();
        assert_eq!(final_path, temp_dir.path().join("dst_1.txt"));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "new");
        assert!(src.exists());
    }

    #[test]
    fn test_copy_with_replace_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        write(&src, "new");
        write(&dst, "old");

        let final_path = relocate(&src, &dst, RelocationMode::Copy { replace: true }).unwrap();
        assert_eq!(final_path, dst);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
    }

    #[test]
    fn test_copy_preserves_modification_time() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("old.txt");
        write(&src, "vintage");
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let dst = temp_dir.path().join("copy/old.txt");
        relocate(&src, &dst, RelocationMode::Copy { replace: true }).unwrap();

        let copied = fs::metadata(&dst).unwrap().modified().unwrap();
        assert_eq!(copied, past);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("script.sh");
        write(&src, "#!/bin/sh\n");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o750)).unwrap();

        let dst = temp_dir.path().join("bin/script.sh");
        relocate(&src, &dst, RelocationMode::Copy { replace: false }).unwrap();

        let mode = fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_read_only_source() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("locked.txt");
        write(&src, "do not touch");
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_200_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(past)
            .unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o444)).unwrap();

        // Fresh destination, then replacing an existing read-only copy.
        let dst = temp_dir.path().join("mirror/locked.txt");
        relocate(&src, &dst, RelocationMode::Copy { replace: false }).unwrap();
        let final_path = relocate(&src, &dst, RelocationMode::Copy { replace: true }).unwrap();

        assert_eq!(final_path, dst);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "do not touch");
        let metadata = fs::metadata(&dst).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o444);
        assert_eq!(metadata.modified().unwrap(), past);

        let names: Vec<_> = fs::read_dir(temp_dir.path().join("mirror"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["locked.txt".to_string()]);
    }

    #[test]
    fn test_copy_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("a.bin");
        write(&src, "abc");
        let out = temp_dir.path().join("out");
        relocate(&src, &out.join("a.bin"), RelocationMode::Copy { replace: false }).unwrap();

        let names: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.bin".to_string()]);
    }

    #[test]
    fn test_missing_source_is_io_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = relocate(
            &temp_dir.path().join("ghost.txt"),
            &temp_dir.path().join("dest.txt"),
            RelocationMode::Move,
        );
        assert!(matches!(result, Err(WardenError::IoFailure { .. })));
        assert!(!temp_dir.path().join("dest.txt").exists());
    }

    #[test]
    fn test_plan_execute_moves_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("clip.mp4");
        write(&src, "video");
        let plan = RelocationPlan::new(&src, temp_dir.path().join("Videos/clip.mp4"));
        let final_path = plan.execute(true).unwrap();
        assert!(final_path.ends_with("Videos/clip.mp4"));
        assert!(!src.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_cross_device_error_detection() {
        assert!(is_cross_device_error(&io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&io::Error::from_raw_os_error(2)));
        assert!(!is_cross_device_error(&io::Error::other("boom")));
    }
}

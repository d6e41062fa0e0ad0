//! Cache root housekeeping: size and age of cached entries

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::info;
use walkdir::WalkDir;

use super::manager::is_marker;

fn newest(dir: &Path, stamp: impl Fn(&std::fs::Metadata) -> io::Result<SystemTime>) -> SystemTime {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter_map(|meta| stamp(&meta).ok())
        .max()
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Most recent access time of anything below `dir`
pub fn dir_last_use(dir: &Path) -> SystemTime {
    newest(dir, |meta| meta.accessed())
}

/// Most recent modification time of anything below `dir`
pub fn dir_last_modified(dir: &Path) -> SystemTime {
    newest(dir, |meta| meta.modified())
}

/// Total size in bytes of the regular files below `dir`
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Remove sub-directories of `dir` not used for longer than `min_age`.
///
/// Returns the number of removed directories. A missing `dir` is empty.
pub fn clear_older_than(dir: &Path, min_age: Duration) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let age = now
            .duration_since(dir_last_use(&path))
            .unwrap_or(Duration::ZERO);
        if age > min_age {
            std::fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }

    // Markers whose sandbox is gone
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if is_marker(&path) && !path.with_extension("").exists() {
            std::fs::remove_file(&path)?;
        }
    }

    info!("Removed {} cache entries older than {:?} from {:?}", removed, min_age, dir);
    Ok(removed)
}

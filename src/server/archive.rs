//! Zip archives of assignment test suites

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::sandbox::dir_last_modified;

/// Archive path for a suite directory (`<suite>.zip` next to it)
pub fn archive_path(dir: &Path) -> PathBuf {
    dir.with_extension("zip")
}

/// Return the suite's archive, rebuilding it when older than the suite
pub fn ensure_archive(dir: &Path) -> anyhow::Result<PathBuf> {
    let zip_path = archive_path(dir);

    let archived_at = std::fs::metadata(&zip_path)
        .and_then(|m| m.modified())
        .ok();
    let stale = match archived_at {
        Some(time) => time < dir_last_modified(dir),
        None => true,
    };

    if stale {
        write_archive(dir, &zip_path)?;
        info!("Archived {:?} to {:?}", dir, zip_path);
    }
    Ok(zip_path)
}

/// Zip every file below `dir`, with paths relative to it
fn write_archive(dir: &Path, dest: &Path) -> anyhow::Result<()> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(parent)?;

    let mut zip = ZipWriter::new(tmp.reopen()?);
    let options = SimpleFileOptions::default();

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dir)?;
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
        }
    }
    zip.finish()?;

    tmp.persist(dest)?;
    // A suite edited within the same second must still look newer
    File::options()
        .write(true)
        .open(dest)?
        .set_modified(SystemTime::now())?;
    Ok(())
}

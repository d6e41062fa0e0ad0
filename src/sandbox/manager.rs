//! Sandbox directories under a cache root
//!
//! Each resolved stage maps to one directory named after its cache key.
//! A directory only counts as a cache hit once its stage ran successfully,
//! which is recorded by a `<name>.complete` marker next to it.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::key::CacheKey;
use crate::error::GradeError;
use crate::pipeline::{PathMapping, ResolvedStage};

const COMPLETE_SUFFIX: &str = "complete";

type KeyLocks = Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>;

/// Owner of a cache root; hands out one sandbox per cache key
#[derive(Debug, Clone)]
pub struct SandboxManager {
    root: PathBuf,
    cache: bool,
    /// Shared by every manager derived from the same root
    locks: KeyLocks,
}

impl SandboxManager {
    /// Create a manager rooted at `root`; `cache = false` purges matching entries
    pub fn new(root: impl AsRef<Path>, cache: bool) -> Self {
        let root = root.as_ref();
        Self {
            root: std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf()),
            cache,
            locks: KeyLocks::default(),
        }
    }

    /// Manager for a sub-directory of this root (e.g. `<assignment>/<user>`)
    pub fn scoped(&self, subpath: impl AsRef<Path>, cache: bool) -> Self {
        Self {
            root: self.root.join(subpath),
            cache,
            locks: Arc::clone(&self.locks),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache
    }

    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Name the sandbox for `stage` and report whether it is a cache hit.
    ///
    /// The returned sandbox holds the key's lock until dropped, so only one
    /// execution per key can check, prepare or run at a time.
    pub async fn acquire(&self, stage: &ResolvedStage) -> Result<Sandbox, GradeError> {
        let key = CacheKey::derive(stage).await?;
        let path = self.root.join(key.dir_name());
        let marker = complete_marker(&path);

        let guard = self.lock_for(&path).lock_owned().await;

        let is_dir = fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let is_complete = fs::try_exists(&marker).await.unwrap_or(false);
        let cached = self.cache && is_dir && is_complete;

        if !self.cache && is_dir {
            debug!("Clean run, purging {:?}", path);
            remove_entry(&path).await?;
            remove_entry(&marker).await?;
        }

        Ok(Sandbox {
            path,
            cached,
            files: stage.files.clone(),
            _guard: guard,
        })
    }
}

/// Marker recording that a sandbox's stage completed successfully
fn complete_marker(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(COMPLETE_SUFFIX);
    path.with_file_name(name)
}

/// Whether `path` is a completion marker rather than a sandbox
pub(crate) fn is_marker(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == COMPLETE_SUFFIX)
}

async fn remove_entry(path: &Path) -> Result<(), GradeError> {
    let result = match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GradeError::io(path, e)),
    }
}

/// A stage's directory. Does not exist on disk until [`Sandbox::prepare`].
#[derive(Debug)]
pub struct Sandbox {
    path: PathBuf,
    cached: bool,
    files: Vec<PathMapping>,
    _guard: OwnedMutexGuard<()>,
}

impl Sandbox {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Wipe any leftover and copy every input file into place
    pub async fn prepare(&self) -> Result<(), GradeError> {
        remove_entry(&complete_marker(&self.path)).await?;
        remove_entry(&self.path).await?;

        fs::create_dir_all(&self.path)
            .await
            .map_err(|e| GradeError::io(&self.path, e))?;

        for file in &self.files {
            let target = self.path.join(&file.target);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| GradeError::io(parent, e))?;
            }
            fs::copy(&file.source, &target)
                .await
                .map_err(|e| GradeError::io(&file.source, e))?;
        }

        debug!("Prepared {:?} with {} file(s)", self.path, self.files.len());
        Ok(())
    }

    /// Mark the sandbox as reusable after its stage succeeded
    pub async fn commit(&self) -> Result<(), GradeError> {
        let marker = complete_marker(&self.path);
        fs::write(&marker, b"")
            .await
            .map_err(|e| GradeError::io(&marker, e))
    }

    /// Delete the sandbox after a failed stage
    pub async fn discard(&self) {
        if let Err(e) = remove_entry(&self.path).await {
            warn!("Failed to remove failed sandbox {:?}: {}", self.path, e);
        }
    }
}

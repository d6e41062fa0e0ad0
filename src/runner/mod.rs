//! Runner module - Command execution boundary
//!
//! This module provides a unified interface for running a stage's command
//! inside its sandbox directory:
//! - `DirectRunner`: spawns the command as a child process
//! - `ContainerRunner`: runs the command in a disposable docker container
//!
//! Every runner writes two side files into the sandbox before returning:
//! - `.stdout.<dir name>`: captured standard output
//! - `.time.<dir name>`: wall-clock duration in seconds
//!
//! The runner module does NOT:
//! - Decide whether a stage needs to run (cache hits are resolved earlier)
//! - Interpret the captured output as a score

pub mod container;
pub mod direct;
#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::error::RunError;

/// Default time budget for a single command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runner trait for executing a stage command in a directory
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `command` with `dir` as working directory.
    ///
    /// Fails with a [`RunError`] on non-zero exit or timeout.
    async fn run(&self, command: &[String], dir: &Path) -> Result<(), RunError>;
}

fn side_file(dir: &Path, kind: &str) -> PathBuf {
    let name = dir.file_name().unwrap_or_default().to_string_lossy();
    dir.join(format!(".{}.{}", kind, name))
}

/// Captured standard output of the command run in `dir`
pub fn stdout_path(dir: &Path) -> PathBuf {
    side_file(dir, "stdout")
}

/// Measured duration of the command run in `dir`
pub fn time_path(dir: &Path) -> PathBuf {
    side_file(dir, "time")
}

/// Spawn `argv` in `cwd`, recording stdout and duration into `dir`.
///
/// `command` is the stage command as declared, used in error messages.
pub(crate) async fn execute_recorded(
    argv: &[String],
    command: &[String],
    cwd: &Path,
    dir: &Path,
    timeout: Duration,
) -> Result<Duration, RunError> {
    let display = format!("{:?}", command);
    let record_err = |source: io::Error| RunError::Record {
        command: display.clone(),
        source,
    };

    let (program, args) = argv.split_first().ok_or_else(|| RunError::Spawn {
        command: display.clone(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
    })?;

    let stdout = tokio::fs::File::create(stdout_path(dir))
        .await
        .map_err(record_err)?
        .into_std()
        .await;

    debug!("Executing {:?} in {:?}", argv, cwd);

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn {
            command: display.clone(),
            source,
        })?;

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return Err(RunError::Failed {
                command: display,
                status: format!("wait failed: {}", e),
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(RunError::TimedOut {
                command: display,
                timeout,
            });
        }
    };
    let elapsed = start.elapsed();

    tokio::fs::write(time_path(dir), elapsed.as_secs_f64().to_string())
        .await
        .map_err(record_err)?;

    if !status.success() {
        return Err(RunError::Failed {
            command: display,
            status: status.to_string(),
        });
    }

    Ok(elapsed)
}

// Re-exports
pub use container::ContainerRunner;
pub use direct::DirectRunner;

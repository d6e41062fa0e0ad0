//! Error taxonomy for pipeline execution
//!
//! Every error here is scoped to a single pipeline run (a group setup or a
//! test case). The orchestrator turns them into result entries; none of them
//! aborts a whole grading run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a command executed by a [`crate::runner::Runner`]
#[derive(Debug, Error)]
pub enum RunError {
    /// Command exited with a non-zero status (or was killed by a signal)
    #[error("Command {command} failed: {status}")]
    Failed { command: String, status: String },

    /// Command exceeded its time budget and was killed
    #[error("Command {command} timed out after {}s", timeout.as_secs_f64())]
    TimedOut { command: String, timeout: Duration },

    /// Command could not be started at all
    #[error("Command {command} could not be started: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Side files (stdout / duration) could not be written
    #[error("Failed to record output of {command}: {source}")]
    Record {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while running a pipeline's stages or reading its result
#[derive(Debug, Error)]
pub enum GradeError {
    /// A declared `require`/`include` file does not exist
    #[error("File {} does not exist", path.display())]
    MissingInput { path: PathBuf },

    /// A mapping target that would land outside the sandbox
    #[error("Target {} escapes the sandbox", target.display())]
    InvalidTarget { target: PathBuf },

    /// Invalid glob pattern in a stage declaration
    #[error("Invalid pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error(transparent)]
    Run(#[from] RunError),

    /// The last stage's captured output is missing or not a score
    #[error("Invalid result: {reason}")]
    InvalidResult { reason: String },

    /// `result()` called before any pipeline completed
    #[error("No completed pipeline to read a result from")]
    NoResult,

    /// Hashing, copying or reading a sandbox file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GradeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GradeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A `setup.json` / `test.json` that could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Validation error in {}: step {step} has an empty command", path.display())]
    EmptyCommand { path: PathBuf, step: usize },
}

//! Direct runner implementation
//!
//! Executes stage commands as plain child processes of the grader.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{execute_recorded, Runner, DEFAULT_TIMEOUT};
use crate::error::RunError;

/// Runner that executes commands directly in the sandbox directory
#[derive(Debug, Clone)]
pub struct DirectRunner {
    timeout: Duration,
}

impl DirectRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DirectRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Runner for DirectRunner {
    async fn run(&self, command: &[String], dir: &Path) -> Result<(), RunError> {
        let elapsed = execute_recorded(command, command, dir, dir, self.timeout).await?;
        debug!("{:?} finished in {:.3}s", command, elapsed.as_secs_f64());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{stdout_path, time_path};
    use std::fs;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_stdout_and_time() {
        let dir = tempfile::tempdir().unwrap();
        let runner = DirectRunner::default();

        runner.run(&sh("echo 0.85"), dir.path()).await.unwrap();

        assert_eq!(fs::read_to_string(stdout_path(dir.path())).unwrap(), "0.85\n");
        let seconds: f64 = fs::read_to_string(time_path(dir.path()))
            .unwrap()
            .parse()
            .unwrap();
        assert!(seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_runs_in_sandbox_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("input.txt"), "42").unwrap();

        DirectRunner::default()
            .run(&sh("cat input.txt > copy.txt"), dir.path())
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("copy.txt")).unwrap(), "42");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectRunner::default()
            .run(&sh("exit 3"), dir.path())
            .await
            .unwrap_err();

        match err {
            RunError::Failed { command, status } => {
                assert!(command.contains("exit 3"));
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectRunner::new(Duration::from_millis(100))
            .run(&sh("sleep 10"), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::TimedOut { .. }));
        assert!(!time_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectRunner::default()
            .run(&["./does-not-exist".to_string()], dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Spawn { .. }));
    }
}

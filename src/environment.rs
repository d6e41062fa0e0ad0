//! Execution environment for pipelines
//!
//! An `Environment` threads a working directory through a pipeline's stages:
//! each stage reads its `require` files from the current directory, runs in
//! its own sandbox, and that sandbox becomes the next stage's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use crate::error::GradeError;
use crate::pipeline::{Pipeline, ResolvedStage, Stage};
use crate::runner::{stdout_path, time_path, Runner};
use crate::sandbox::{Sandbox, SandboxManager};

/// Mutable execution cursor; clones share nothing mutable
#[derive(Clone)]
pub struct Environment {
    current_dir: PathBuf,
    elapsed_time: f64,
    /// Last stage directory of the last pipeline that completed
    last_stage_dir: Option<PathBuf>,
    runner: Arc<dyn Runner>,
    sandboxes: SandboxManager,
}

impl Environment {
    pub fn new(
        initial_dir: impl Into<PathBuf>,
        runner: Arc<dyn Runner>,
        sandboxes: SandboxManager,
    ) -> Self {
        Self {
            current_dir: initial_dir.into(),
            elapsed_time: 0.0,
            last_stage_dir: None,
            runner,
            sandboxes,
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Accumulated duration of time-significant stages, in seconds
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// Run the pipeline's stages starting from the current directory.
    ///
    /// Stops at the first failing stage; its sandbox is deleted.
    pub async fn run_stages(&mut self, pipeline: &Pipeline) -> Result<(), GradeError> {
        self.last_stage_dir = None;
        let name = pipeline.display_name();

        for (i, stage) in pipeline.steps.iter().enumerate() {
            let resolved = resolve_stage(stage, pipeline.dir(), &self.current_dir).await?;
            let sandbox = self.sandboxes.acquire(&resolved).await?;
            self.current_dir = sandbox.path().to_path_buf();

            if sandbox.is_cached() {
                info!(
                    "[cache hit] Skipping {}[{}]: {}",
                    name,
                    i,
                    resolved.command_display()
                );
            } else {
                info!(
                    "[cache miss] Running {}[{}]: {}",
                    name,
                    i,
                    resolved.command_display()
                );
                if let Err(e) = self.execute(&sandbox, &resolved.command).await {
                    sandbox.discard().await;
                    return Err(e);
                }
            }

            if stage.time_it {
                self.elapsed_time += read_duration(sandbox.path()).await?;
            }
        }

        self.last_stage_dir = Some(self.current_dir.clone());
        Ok(())
    }

    async fn execute(&self, sandbox: &Sandbox, command: &[String]) -> Result<(), GradeError> {
        sandbox.prepare().await?;
        self.runner.run(command, sandbox.path()).await?;
        sandbox.commit().await
    }

    /// Score printed by the last stage of the last completed pipeline
    pub async fn result(&self) -> Result<f64, GradeError> {
        let dir = self.last_stage_dir.as_ref().ok_or(GradeError::NoResult)?;
        let path = stdout_path(dir);

        let raw = fs::read_to_string(&path)
            .await
            .map_err(|e| GradeError::InvalidResult {
                reason: format!("cannot read {}: {}", path.display(), e),
            })?;

        let value = raw.trim();
        match value.parse::<f64>() {
            Ok(score) if score.is_finite() => Ok(score),
            _ => Err(GradeError::InvalidResult {
                reason: format!("{:?} is not a finite number", value),
            }),
        }
    }
}

/// Resolve on the blocking pool: canonicalization and glob walks are synchronous
async fn resolve_stage(
    stage: &Stage,
    include_dir: &Path,
    require_dir: &Path,
) -> Result<ResolvedStage, GradeError> {
    let stage = stage.clone();
    let include_dir = include_dir.to_path_buf();
    let require_dir = require_dir.to_path_buf();
    let context = require_dir.clone();

    tokio::task::spawn_blocking(move || stage.resolve(&include_dir, &require_dir))
        .await
        .map_err(|e| GradeError::io(context, std::io::Error::other(e)))?
}

async fn read_duration(dir: &Path) -> Result<f64, GradeError> {
    let path = time_path(dir);
    let raw = fs::read_to_string(&path)
        .await
        .map_err(|e| GradeError::io(&path, e))?;

    raw.trim().parse::<f64>().map_err(|e| {
        GradeError::io(
            &path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

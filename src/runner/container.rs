//! Container runner implementation
//!
//! Runs stage commands inside a disposable docker container with the sandbox
//! bind-mounted read-write as the working directory.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{execute_recorded, Runner, DEFAULT_TIMEOUT};
use crate::error::RunError;

/// Default image providing the toolchains used by the test suites
pub const DEFAULT_IMAGE: &str = "carlogauss33/edd-runner";

/// Mount point of the sandbox inside the container
const MOUNT_POINT: &str = "/app";

/// Runner that executes commands in a fresh container per stage
#[derive(Debug, Clone)]
pub struct ContainerRunner {
    /// Container CLI (docker or a compatible one)
    program: String,
    image: String,
    timeout: Duration,
}

impl ContainerRunner {
    pub fn new(image: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: "docker".to_string(),
            image: image.into(),
            timeout,
        }
    }

    /// Use another docker-compatible CLI (e.g. `podman`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn container_name(dir: &Path) -> String {
        let name = dir.file_name().unwrap_or_default().to_string_lossy();
        let prefix: String = name.chars().take(12).collect();
        format!("grader-{}-{:08x}", prefix, rand::random::<u32>())
    }

    fn docker_command(&self, dir: &Path, command: &[String], name: &str) -> Vec<String> {
        let mut docker_command = vec![self.program.clone(), "run".to_string()];
        docker_command.extend([
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--volume".to_string(),
            format!("{}:{}", dir.display(), MOUNT_POINT),
            "--workdir".to_string(),
            MOUNT_POINT.to_string(),
            self.image.clone(),
        ]);
        docker_command.extend(command.iter().cloned());
        docker_command
    }

    /// Force-remove a container left running by a timed out client
    async fn remove_container(&self, name: &str) {
        match Command::new(&self.program)
            .args(["rm", "-f", name])
            .output()
            .await
        {
            Ok(output) if output.status.success() => debug!("Removed container {}", name),
            Ok(output) => warn!(
                "Failed to remove container {}: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("Failed to remove container {}: {}", name, e),
        }
    }
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    async fn run(&self, command: &[String], dir: &Path) -> Result<(), RunError> {
        let name = Self::container_name(dir);
        let argv = self.docker_command(dir, command, &name);

        match execute_recorded(&argv, command, dir, dir, self.timeout).await {
            Err(err @ RunError::TimedOut { .. }) => {
                self.remove_container(&name).await;
                Err(err)
            }
            other => other.map(|_| ()),
        }
    }
}

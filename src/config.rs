//! Grader settings
//!
//! Loaded from an optional TOML file (`GRADER_CONFIG`, default
//! `./grader.toml`), then overridden by `GRADER_*` environment variables.

use anyhow::Context;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::runner::container::DEFAULT_IMAGE;
use crate::runner::{ContainerRunner, DirectRunner, Runner, DEFAULT_TIMEOUT};

const DEFAULT_CONFIG_PATH: &str = "./grader.toml";

/// Which runner executes stage commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Direct,
    #[default]
    Docker,
}

impl FromStr for RunnerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(RunnerKind::Direct),
            "docker" => Ok(RunnerKind::Docker),
            other => anyhow::bail!("Unknown runner {:?} (expected direct or docker)", other),
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Direct => f.write_str("direct"),
            RunnerKind::Docker => f.write_str("docker"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the sandbox cache
    pub cache_dir: PathBuf,
    /// Where submissions are cloned to
    pub repos_dir: PathBuf,
    /// Root of the assignment test suites
    pub tests_dir: PathBuf,
    pub runner: RunnerKind,
    pub docker_image: String,
    /// Per-command time budget in seconds
    pub timeout_secs: u64,
    /// Organization owning the submission repositories
    pub git_org: String,
    pub git_base_url: String,
    /// Bearer secret for the HTTP server
    pub secret: Option<String>,
    pub bind: SocketAddr,
}

impl Default for Settings {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            cache_dir: tmp.join(".edd-cache"),
            repos_dir: tmp.join(".edd-repos"),
            tests_dir: PathBuf::from("tests"),
            runner: RunnerKind::default(),
            docker_image: DEFAULT_IMAGE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            git_org: "IIC2133-PUC".to_string(),
            git_base_url: "https://github.com".to_string(),
            secret: None,
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

impl Settings {
    /// Load from the config file named by `GRADER_CONFIG` and the environment
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("GRADER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut settings = Self::from_file(Path::new(&path))?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a TOML settings file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings file {:?}", path))
    }

    /// Override fields from `GRADER_*` variables found by `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("GRADER_CACHE_DIR") {
            self.cache_dir = v.into();
        }
        if let Some(v) = lookup("GRADER_REPOS_DIR") {
            self.repos_dir = v.into();
        }
        if let Some(v) = lookup("GRADER_TESTS_DIR") {
            self.tests_dir = v.into();
        }
        if let Some(v) = lookup("GRADER_RUNNER") {
            self.runner = v.parse()?;
        }
        if let Some(v) = lookup("GRADER_DOCKER_IMAGE") {
            self.docker_image = v;
        }
        if let Some(v) = lookup("GRADER_TIMEOUT_SECS") {
            self.timeout_secs = v
                .parse()
                .with_context(|| format!("Invalid GRADER_TIMEOUT_SECS: {}", v))?;
        }
        if let Some(v) = lookup("GRADER_GIT_ORG") {
            self.git_org = v;
        }
        if let Some(v) = lookup("GRADER_GIT_BASE_URL") {
            self.git_base_url = v;
        }
        if let Some(v) = lookup("GRADER_SECRET") {
            self.secret = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("GRADER_BIND") {
            self.bind = v
                .parse()
                .with_context(|| format!("Invalid GRADER_BIND: {}", v))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Instantiate the configured runner
    pub fn build_runner(&self) -> Arc<dyn Runner> {
        match self.runner {
            RunnerKind::Direct => Arc::new(DirectRunner::new(self.timeout())),
            RunnerKind::Docker => {
                Arc::new(ContainerRunner::new(self.docker_image.clone(), self.timeout()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.runner, RunnerKind::Docker);
        assert_eq!(settings.docker_image, "carlogauss33/edd-runner");
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert!(settings.cache_dir.ends_with(".edd-cache"));
        assert_eq!(settings.bind.port(), 8000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grader.toml");
        std::fs::write(
            &path,
            "runner = \"direct\"\ntimeout_secs = 30\ntests_dir = \"/srv/tests\"\n",
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.runner, RunnerKind::Direct);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.tests_dir, PathBuf::from("/srv/tests"));
        assert_eq!(settings.git_org, "IIC2133-PUC");
    }

    #[test]
    fn test_missing_file_is_default() {
        let settings = Settings::from_file(Path::new("/no/such/grader.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grader.toml");
        std::fs::write(&path, "runner = \"kubernetes\"").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GRADER_RUNNER", "DIRECT"),
            ("GRADER_TIMEOUT_SECS", "3"),
            ("GRADER_SECRET", "s3cret"),
            ("GRADER_BIND", "127.0.0.1:9000"),
        ]);
        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.runner, RunnerKind::Direct);
        assert_eq!(settings.timeout(), Duration::from_secs(3));
        assert_eq!(settings.secret.as_deref(), Some("s3cret"));
        assert_eq!(settings.bind.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let mut settings = Settings::default();
        assert!(settings
            .apply_env(|key| (key == "GRADER_TIMEOUT_SECS").then(|| "soon".to_string()))
            .is_err());
    }
}

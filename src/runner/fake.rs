//! Scripted runner for tests: no processes, deterministic output and timing

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::{stdout_path, time_path, Runner};
use crate::error::RunError;

/// What a scripted command does when run
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    pub stdout: String,
    pub seconds: f64,
    pub fail: bool,
    /// Files the command writes into its sandbox
    pub creates: Vec<(String, String)>,
}

impl Script {
    pub fn prints(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn takes(mut self, seconds: f64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn creates(mut self, name: &str, content: &str) -> Self {
        self.creates.push((name.to_string(), content.to_string()));
        self
    }

    pub fn fails() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

/// Runner keyed by the command's program name; records every invocation
#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, program: &str, script: Script) -> Self {
        self.scripts.insert(program.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c[0].clone()).collect()
    }
}

#[async_trait]
impl Runner for FakeRunner {
    async fn run(&self, command: &[String], dir: &Path) -> Result<(), RunError> {
        self.calls.lock().unwrap().push(command.to_vec());

        let script = self.scripts.get(&command[0]).cloned().unwrap_or_default();
        let display = format!("{:?}", command);

        std::fs::write(stdout_path(dir), &script.stdout).unwrap();
        std::fs::write(time_path(dir), script.seconds.to_string()).unwrap();
        for (name, content) in &script.creates {
            std::fs::write(dir.join(name), content).unwrap();
        }

        if script.fail {
            return Err(RunError::Failed {
                command: display,
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

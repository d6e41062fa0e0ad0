//! Pipeline module - Declarative test pipelines
//!
//! This module provides the data model loaded from `setup.json` / `test.json`:
//! - `Stage`: files to place in a sandbox plus the command to run there
//! - `Pipeline`: an ordered list of stages anchored to its declaration directory
//! - `TestGroup`: a setup pipeline owning its test case pipelines
//!
//! The pipeline module does NOT:
//! - Execute anything (that's the environment's job)
//! - Decide cache hits (that's the sandbox manager's job)

pub mod finder;
pub mod resolve;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::GradeError;

pub use resolve::resolve_paths;

/// One file's placement inside a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// File to copy (absolute once resolved)
    pub source: PathBuf,
    /// Location relative to the sandbox root
    pub target: PathBuf,
}

impl fmt::Display for PathMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.display(), self.target.display())
    }
}

/// A declared file requirement: a literal path, a glob, or an explicit mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSpec {
    Path(String),
    Mapping(PathMapping),
}

impl PathSpec {
    /// Whether this entry is expanded as a glob pattern
    pub fn is_pattern(&self) -> bool {
        match self {
            PathSpec::Path(path) => path.contains(['*', '?', '[']),
            PathSpec::Mapping(_) => false,
        }
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        PathSpec::Path(path.to_string())
    }
}

/// One declared step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Files taken from the previous stage's output directory
    #[serde(default)]
    pub require: Vec<PathSpec>,
    /// Files taken from the pipeline's own declaration directory
    #[serde(default)]
    pub include: Vec<PathSpec>,
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Whether this stage's duration counts towards the reported time
    #[serde(default, alias = "time_significant")]
    pub time_it: bool,
}

impl Stage {
    /// Resolve `include` against `include_dir` and `require` against `require_dir`
    pub fn resolve(&self, include_dir: &Path, require_dir: &Path) -> Result<ResolvedStage, GradeError> {
        let mut files = resolve_paths(&self.include, include_dir)?;
        files.extend(resolve_paths(&self.require, require_dir)?);

        Ok(ResolvedStage {
            files,
            command: self.command.clone(),
        })
    }
}

/// A stage with every file requirement turned into a concrete mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStage {
    pub files: Vec<PathMapping>,
    pub command: Vec<String>,
}

impl ResolvedStage {
    /// Command rendered for logs and error messages
    pub fn command_display(&self) -> String {
        format!("{:?}", self.command)
    }
}

/// A named, ordered sequence of stages anchored to a declaration directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Stage>,
    /// Directory the pipeline was declared in (base for `include`)
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Pipeline {
    pub fn new(name: Option<&str>, steps: Vec<Stage>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.map(str::to_string),
            steps,
            dir: dir.into(),
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Declared name, or the declaration directory's name
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// A test case is a pipeline without children
pub type TestCase = Pipeline;

/// A setup pipeline plus the test cases forked from its result
#[derive(Debug, Clone, PartialEq)]
pub struct TestGroup {
    pub setup: Pipeline,
    pub tests: Vec<TestCase>,
}

impl TestGroup {
    pub fn new(setup: Pipeline) -> Self {
        Self {
            setup,
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    pub fn display_name(&self) -> String {
        self.setup.display_name()
    }
}

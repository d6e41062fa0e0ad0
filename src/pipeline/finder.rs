//! Test suite discovery
//!
//! A suite directory holds one sub-directory per group with a `setup.json`,
//! and each group one sub-directory per test case with a `test.json`:
//!
//! ```text
//! <suite>/<group>/setup.json
//! <suite>/<group>/<case>/test.json
//! ```
//!
//! Files that fail to load are skipped with a warning, as are groups
//! without any test case.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use super::{Pipeline, TestGroup};
use crate::error::ConfigError;
use crate::sandbox::dir_last_use;

pub const GROUP_FILE: &str = "setup.json";
pub const CASE_FILE: &str = "test.json";

/// Load one pipeline declaration, anchored to the file's directory
pub fn load_pipeline(file: &Path) -> Result<Pipeline, ConfigError> {
    let raw = fs::read_to_string(file).map_err(|source| ConfigError::Read {
        path: file.to_path_buf(),
        source,
    })?;

    let pipeline: Pipeline = serde_json::from_str(&raw).map_err(|source| ConfigError::Invalid {
        path: file.to_path_buf(),
        source,
    })?;

    if let Some(step) = pipeline.steps.iter().position(|s| s.command.is_empty()) {
        return Err(ConfigError::EmptyCommand {
            path: file.to_path_buf(),
            step,
        });
    }

    let dir = file.parent().unwrap_or(Path::new(".")).to_path_buf();
    Ok(pipeline.with_dir(dir))
}

/// `<dir>/*/<file_name>` in sorted order
fn declarations(dir: &Path, file_name: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path().join(file_name))
        .filter(|file| file.is_file())
        .collect();
    files.sort();
    files
}

fn load_or_warn(file: &Path, kind: &str) -> Option<Pipeline> {
    match load_pipeline(file) {
        Ok(pipeline) => Some(pipeline),
        Err(e) => {
            warn!("Skipping test {} {:?}: {}", kind, file, e);
            None
        }
    }
}

/// Every test group with its test cases under `suite_dir`
pub fn find_groups(suite_dir: &Path) -> Vec<TestGroup> {
    let mut groups = Vec::new();

    for setup_file in declarations(suite_dir, GROUP_FILE) {
        let Some(setup) = load_or_warn(&setup_file, "group") else {
            continue;
        };

        let mut group = TestGroup::new(setup);
        for case_file in declarations(group.setup.dir(), CASE_FILE) {
            if let Some(case) = load_or_warn(&case_file, "case") {
                group.add_test(case);
            }
        }

        if group.tests.is_empty() {
            warn!("Skipping group {} with no tests", group.display_name());
            continue;
        }
        groups.push(group);
    }

    groups
}

/// An assignment's test suite as listed by the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Directory of test suites, one sub-directory per assignment
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of an assignment's suite, if `name` is a plain existing directory
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain {
            return None;
        }

        let path = self.root.join(name);
        path.is_dir().then_some(path)
    }

    /// Every assignment with at least one runnable group, sorted by name
    pub fn list(&self) -> io::Result<Vec<Assignment>> {
        let mut assignments = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }

            if find_groups(&path).is_empty() {
                warn!("Skipping assignment {:?} with no groups", path);
                continue;
            }

            assignments.push(Assignment {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                updated_at: dir_last_use(&path).into(),
            });
        }

        assignments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(assignments)
    }

    /// Groups of an assignment; `None` when unknown or without runnable groups
    pub fn get(&self, name: &str) -> Option<Vec<TestGroup>> {
        let groups = find_groups(&self.path(name)?);
        (!groups.is_empty()).then_some(groups)
    }
}

//! Grading result types
//!
//! Serialized with a `verdict` tag so consumers can branch on `"ok"` / `"error"`
//! at both the group and the test level.

use serde::{Deserialize, Serialize};

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum TestResult {
    Ok {
        name: String,
        elapsed_time: f64,
        score: f64,
    },
    Error {
        name: String,
        error: String,
    },
}

impl TestResult {
    pub fn name(&self) -> &str {
        match self {
            TestResult::Ok { name, .. } | TestResult::Error { name, .. } => name,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TestResult::Ok { .. })
    }
}

/// Outcome of one test group: either its setup failed, or a result per test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GroupResult {
    Ok {
        name: String,
        results: Vec<TestResult>,
    },
    Error {
        name: String,
        error: String,
    },
}

impl GroupResult {
    pub fn name(&self) -> &str {
        match self {
            GroupResult::Ok { name, .. } | GroupResult::Error { name, .. } => name,
        }
    }

    /// Test results recorded so far (empty for a failed setup)
    pub fn tests(&self) -> &[TestResult] {
        match self {
            GroupResult::Ok { results, .. } => results,
            GroupResult::Error { .. } => &[],
        }
    }
}

/// Everything reported for one user's submission to one assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResults {
    pub name: String,
    pub user: String,
    pub results: Vec<GroupResult>,
}

//! Cached multi-stage test pipelines for student submissions
//!
//! A test suite is a list of [`pipeline::TestGroup`]s. The [`orchestrator`]
//! runs each group's setup once against a submission checkout, forks every
//! test case from the result, and reports one [`results::GroupResult`] per
//! group. Stages whose inputs and declaration are unchanged are served from
//! the [`sandbox`] cache instead of running again.

pub mod config;
pub mod environment;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod repository;
pub mod results;
pub mod runner;
pub mod sandbox;
pub mod server;

pub use environment::Environment;
pub use error::{ConfigError, GradeError, RunError};
pub use orchestrator::{Orchestrator, RunWalk};
pub use pipeline::{Pipeline, Stage, TestCase, TestGroup};
pub use results::{AssignmentResults, GroupResult, TestResult};
pub use runner::Runner;
pub use sandbox::SandboxManager;

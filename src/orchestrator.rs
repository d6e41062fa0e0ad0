//! Orchestrator - Runs test groups against one submission checkout
//!
//! Each group gets a fresh `Environment` rooted at the checkout; its setup
//! runs once and every test case forks from the post-setup environment.
//!
//! The orchestrator does NOT:
//! - Discover test groups (see `pipeline::finder`)
//! - Fetch the submission (see `repository`)
//!
//! Failures never escape: a failed setup becomes a `GroupResult::Error`, a
//! failed test case a `TestResult::Error`, and the walk moves on.

use std::path::{Path, PathBuf};
use std::slice;
use std::sync::Arc;
use tracing::{info, warn};

use crate::environment::Environment;
use crate::error::GradeError;
use crate::pipeline::{TestCase, TestGroup};
use crate::results::{GroupResult, TestResult};
use crate::runner::Runner;
use crate::sandbox::SandboxManager;

pub struct Orchestrator {
    repo_dir: PathBuf,
    runner: Arc<dyn Runner>,
    sandboxes: SandboxManager,
}

impl Orchestrator {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        runner: Arc<dyn Runner>,
        sandboxes: SandboxManager,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            runner,
            sandboxes,
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Run every group and collect all results
    pub async fn run(&self, groups: &[TestGroup]) -> Vec<GroupResult> {
        let mut walk = self.walk(groups);
        while walk.next_group().await.is_some() {}
        walk.into_results()
    }

    /// Step through the groups one result at a time
    pub fn walk<'a>(&'a self, groups: &'a [TestGroup]) -> RunWalk<'a> {
        RunWalk {
            orchestrator: self,
            groups: groups.iter(),
            current: None,
            results: Vec::with_capacity(groups.len()),
        }
    }

    fn environment(&self) -> Environment {
        Environment::new(
            &self.repo_dir,
            Arc::clone(&self.runner),
            self.sandboxes.clone(),
        )
    }
}

/// Post-setup state of the group being walked
struct GroupCursor<'a> {
    env: Environment,
    tests: slice::Iter<'a, TestCase>,
}

/// Lazy, single-pass walk over a grading run.
///
/// `next_group` runs a group's setup, `next_test` runs its next test case.
/// Advancing to the next group first finishes the tests left in the current
/// one, so every test gets exactly one result.
pub struct RunWalk<'a> {
    orchestrator: &'a Orchestrator,
    groups: slice::Iter<'a, TestGroup>,
    current: Option<GroupCursor<'a>>,
    results: Vec<GroupResult>,
}

impl<'a> RunWalk<'a> {
    /// Run the next group's setup; `None` once every group has been visited
    pub async fn next_group(&mut self) -> Option<&GroupResult> {
        while self.next_test().await.is_some() {}

        let group = self.groups.next()?;
        let name = group.display_name();
        let mut env = self.orchestrator.environment();

        info!("Running setup for group {}", name);
        match env.run_stages(&group.setup).await {
            Ok(()) => {
                self.results.push(GroupResult::Ok {
                    name,
                    results: Vec::with_capacity(group.tests.len()),
                });
                self.current = Some(GroupCursor {
                    env,
                    tests: group.tests.iter(),
                });
            }
            Err(e) => {
                warn!("Setup for group {} failed: {}", name, e);
                self.results.push(GroupResult::Error {
                    name,
                    error: e.to_string(),
                });
                self.current = None;
            }
        }

        self.results.last()
    }

    /// Run the current group's next test case; `None` when the group is done
    pub async fn next_test(&mut self) -> Option<&TestResult> {
        let cursor = self.current.as_mut()?;
        let Some(test) = cursor.tests.next() else {
            self.current = None;
            return None;
        };

        let name = test.display_name();
        let mut env = cursor.env.clone();
        let result = match run_test(&mut env, test).await {
            Ok(score) => {
                info!("Test {} scored {} in {:.3}s", name, score, env.elapsed_time());
                TestResult::Ok {
                    name,
                    elapsed_time: env.elapsed_time(),
                    score,
                }
            }
            Err(e) => {
                warn!("Test {} failed: {}", name, e);
                TestResult::Error {
                    name,
                    error: e.to_string(),
                }
            }
        };

        match self.results.last_mut() {
            Some(GroupResult::Ok { results, .. }) => {
                results.push(result);
                results.last()
            }
            _ => None,
        }
    }

    /// Result of the group being walked (or last walked)
    pub fn current_group(&self) -> Option<&GroupResult> {
        self.results.last()
    }

    pub fn results(&self) -> &[GroupResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<GroupResult> {
        self.results
    }
}

async fn run_test(env: &mut Environment, test: &TestCase) -> Result<f64, GradeError> {
    env.run_stages(test).await?;
    env.result().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, Stage};
    use crate::runner::fake::{FakeRunner, Script};
    use std::fs;

    struct Fixture {
        repo: tempfile::TempDir,
        cache: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = tempfile::tempdir().unwrap();
            fs::write(repo.path().join("main.c"), "int main() {}").unwrap();
            Self {
                repo,
                cache: tempfile::tempdir().unwrap(),
            }
        }

        fn orchestrator(&self, runner: Arc<FakeRunner>) -> Orchestrator {
            Orchestrator::new(
                self.repo.path(),
                runner,
                SandboxManager::new(self.cache.path(), true),
            )
        }
    }

    fn pipeline(name: &str, require: &[&str], program: &str, arg: &str) -> Pipeline {
        let stage = Stage {
            require: require.iter().map(|&p| p.into()).collect(),
            include: vec![],
            command: vec![program.to_string(), arg.to_string()],
            time_it: true,
        };
        Pipeline::new(Some(name), vec![stage], "/suite")
    }

    fn group(name: &str, setup_program: &str, tests: &[(&str, &str)]) -> TestGroup {
        let mut group = TestGroup::new(pipeline(name, &["main.c"], setup_program, name));
        for (test_name, program) in tests {
            group.add_test(pipeline(test_name, &["a.out"], program, test_name));
        }
        group
    }

    fn runner() -> Arc<FakeRunner> {
        Arc::new(
            FakeRunner::new()
                .with("cc", Script::prints("").creates("a.out", "bin").takes(1.0))
                .with("broken-cc", Script::fails())
                .with("pass", Script::prints("1.0").takes(0.5))
                .with("half", Script::prints("0.5\n").takes(0.25))
                .with("crash", Script::fails()),
        )
    }

    #[tokio::test]
    async fn test_failed_setup_yields_single_group_error() {
        let fixture = Fixture::new();
        let runner = runner();
        let groups = vec![group("g1", "broken-cc", &[("t1", "pass"), ("t2", "pass")])];

        let results = fixture.orchestrator(runner.clone()).run(&groups).await;

        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], GroupResult::Error { name, .. } if name == "g1"));
        assert!(results[0].tests().is_empty());
        assert_eq!(runner.programs(), vec!["broken-cc"]);
    }

    #[tokio::test]
    async fn test_failing_test_does_not_stop_siblings() {
        let fixture = Fixture::new();
        let groups = vec![group(
            "g1",
            "cc",
            &[("t1", "pass"), ("t2", "half"), ("t3", "crash"), ("t4", "pass")],
        )];

        let results = fixture.orchestrator(runner()).run(&groups).await;

        let tests = results[0].tests();
        assert!(matches!(&results[0], GroupResult::Ok { .. }));
        assert_eq!(tests.len(), 4);
        assert_eq!(
            tests[0],
            TestResult::Ok {
                name: "t1".to_string(),
                elapsed_time: 1.5,
                score: 1.0,
            }
        );
        assert_eq!(
            tests[1],
            TestResult::Ok {
                name: "t2".to_string(),
                elapsed_time: 1.25,
                score: 0.5,
            }
        );
        assert!(matches!(&tests[2], TestResult::Error { name, error } if name == "t3" && error.contains("failed")));
        assert!(tests[3].is_ok());
    }

    #[tokio::test]
    async fn test_setup_runs_once_per_group() {
        let fixture = Fixture::new();
        let runner = runner();
        let groups = vec![
            group("g1", "cc", &[("t1", "pass"), ("t2", "half")]),
            group("g2", "broken-cc", &[("t3", "pass")]),
            group("g3", "cc", &[("t4", "pass")]),
        ];

        let results = fixture.orchestrator(runner.clone()).run(&groups).await;

        let names: Vec<_> = results.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["g1", "g2", "g3"]);
        assert_eq!(
            runner.programs(),
            vec!["cc", "pass", "half", "broken-cc", "cc", "pass"]
        );
    }

    #[tokio::test]
    async fn test_walk_is_incremental() {
        let fixture = Fixture::new();
        let runner = runner();
        let groups = vec![
            group("g1", "cc", &[("t1", "pass"), ("t2", "half")]),
            group("g2", "cc", &[("t3", "pass")]),
        ];
        let orchestrator = fixture.orchestrator(runner.clone());
        let mut walk = orchestrator.walk(&groups);

        let first = walk.next_group().await.unwrap();
        assert_eq!(first.name(), "g1");
        assert!(first.tests().is_empty());
        assert_eq!(runner.programs(), vec!["cc"]);

        assert_eq!(walk.next_test().await.unwrap().name(), "t1");
        assert_eq!(runner.programs(), vec!["cc", "pass"]);

        // Moving on finishes t2 first
        assert_eq!(walk.next_group().await.unwrap().name(), "g2");
        assert_eq!(walk.results()[0].tests().len(), 2);

        assert_eq!(walk.next_test().await.unwrap().name(), "t3");
        assert!(walk.next_test().await.is_none());
        assert!(walk.next_group().await.is_none());
        assert_eq!(walk.current_group().unwrap().name(), "g2");

        let results = walk.into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(runner.programs(), vec!["cc", "pass", "half", "cc", "pass"]);
    }
}

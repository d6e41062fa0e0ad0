use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use grader::config::{RunnerKind, Settings};
use grader::pipeline::finder::find_groups;
use grader::server::{self, AppState};
use grader::{AssignmentResults, GroupResult, Orchestrator, SandboxManager, TestResult};

#[derive(Parser)]
#[command(name = "grader", version, about = "Run cached test pipelines against submissions")]
struct Cli {
    /// More logging (debug)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Less logging (warnings only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RunnerArg {
    Direct,
    Docker,
}

impl From<RunnerArg> for RunnerKind {
    fn from(value: RunnerArg) -> Self {
        match value {
            RunnerArg::Direct => RunnerKind::Direct,
            RunnerArg::Docker => RunnerKind::Docker,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a local checkout against a test suite
    Run {
        /// Directory with one sub-directory per test group
        #[arg(long)]
        test_dir: Option<PathBuf>,
        /// Submission checkout
        #[arg(long, default_value = ".")]
        repo_dir: PathBuf,
        /// Ignore and replace cached stages
        #[arg(short, long)]
        clean_run: bool,
        #[arg(long, value_enum)]
        runner: Option<RunnerArg>,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Print the full results as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let level = if verbose {
        "grader=debug"
    } else if quiet {
        "grader=warn"
    } else {
        "grader=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let mut settings = Settings::load()?;

    match cli.command {
        Commands::Run {
            test_dir,
            repo_dir,
            clean_run,
            runner,
            cache_dir,
            json,
        } => {
            if let Some(test_dir) = test_dir {
                settings.tests_dir = test_dir;
            }
            if let Some(runner) = runner {
                settings.runner = runner.into();
            }
            if let Some(cache_dir) = cache_dir {
                settings.cache_dir = cache_dir;
            }
            run(&settings, repo_dir, clean_run, json).await
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.bind = bind;
            }
            info!("Starting grader server with {} runner", settings.runner);
            let state = Arc::new(AppState::new(&settings, settings.build_runner()));
            server::serve(state, settings.bind).await
        }
    }
}

async fn run(settings: &Settings, repo_dir: PathBuf, clean_run: bool, json: bool) -> Result<()> {
    anyhow::ensure!(repo_dir.is_dir(), "Repository directory {:?} does not exist", repo_dir);
    anyhow::ensure!(
        settings.tests_dir.is_dir(),
        "Test directory {:?} does not exist",
        settings.tests_dir
    );

    let groups = find_groups(&settings.tests_dir);
    if groups.is_empty() {
        warn!("No test groups found in {:?}", settings.tests_dir);
    }

    let repo_dir = repo_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {:?}", repo_dir))?;
    let sandboxes = SandboxManager::new(&settings.cache_dir, !clean_run);
    let orchestrator = Orchestrator::new(&repo_dir, settings.build_runner(), sandboxes);

    let mut walk = orchestrator.walk(&groups);
    while let Some(group) = walk.next_group().await {
        match group {
            GroupResult::Error { name, error } => {
                if !json {
                    println!("Error preparing {} ({})", name, error);
                }
                continue;
            }
            GroupResult::Ok { name, .. } => {
                if !json {
                    println!("{}", name);
                }
            }
        }

        while let Some(test) = walk.next_test().await {
            if json {
                continue;
            }
            match test {
                TestResult::Ok {
                    name,
                    elapsed_time,
                    score,
                } => println!("  {:<24} ok     {:>8.3}s  {}", name, elapsed_time, score),
                TestResult::Error { name, error } => {
                    println!("  {:<24} error  {}", name, error)
                }
            }
        }
    }

    if json {
        let results = AssignmentResults {
            name: settings.tests_dir.display().to_string(),
            user: repo_dir.display().to_string(),
            results: walk.into_results(),
        };
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

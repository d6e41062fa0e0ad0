//! Server module - HTTP front-end for grading runs
//!
//! Routes (all behind a bearer secret):
//! - `GET /cache`, `DELETE /cache?seconds_old=N`: cache sizes and cleanup
//! - `GET /assignments`: available test suites
//! - `GET /assignments/{name}.zip`: a suite as a zip archive
//! - `POST /assignments/{assignment}/{user}`: fetch a submission and grade it
//!
//! The server module does NOT:
//! - Execute stages itself (it builds an `Orchestrator` per request)
//! - Deliver results to callbacks

pub mod archive;
pub mod auth;

use anyhow::Context;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::pipeline::finder::{Assignment, Catalog};
use crate::repository::RepositoryDownloader;
use crate::results::AssignmentResults;
use crate::runner::Runner;
use crate::sandbox::{clear_older_than, dir_size, SandboxManager};

/// Shared state of the HTTP server
pub struct AppState {
    pub catalog: Catalog,
    pub downloader: RepositoryDownloader,
    pub runner: Arc<dyn Runner>,
    pub sandboxes: SandboxManager,
    pub secret: String,
}

impl AppState {
    pub fn new(settings: &Settings, runner: Arc<dyn Runner>) -> Self {
        Self {
            catalog: Catalog::new(&settings.tests_dir),
            downloader: RepositoryDownloader::new(
                &settings.git_org,
                &settings.git_base_url,
                &settings.repos_dir,
            ),
            runner,
            sandboxes: SandboxManager::new(&settings.cache_dir, true),
            secret: auth::resolve_secret(settings.secret.clone()),
        }
    }
}

/// Error response with a `{"detail": ..}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            detail: String,
        }
        (self.status, Json(Body { detail: self.detail })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Request failed: {:#}", err);
        ApiError::internal("Internal server error")
    }
}

/// Run blocking filesystem work off the async workers
async fn blocking<T: Send + 'static>(
    work: impl FnOnce() -> anyhow::Result<T> + Send + 'static,
) -> Result<T, ApiError> {
    let result = tokio::task::spawn_blocking(work)
        .await
        .context("Blocking task panicked")?;
    Ok(result?)
}

pub fn router(state: Arc<AppState>) -> Router {
    let require_secret = middleware::from_fn_with_state(state.clone(), auth::require_secret);

    Router::new()
        .route("/cache", get(cache_size).delete(clear_cache))
        .route("/assignments", get(list_assignments))
        .route("/assignments/{file}", get(download_assignment))
        .route("/assignments/{assignment}/{user}", post(run_assignment))
        .layer(require_secret)
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: Arc<AppState>, bind: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on {}", bind);

    axum::serve(listener, router(state))
        .await
        .context("Server error")
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheSize {
    pub repos: u64,
    pub output: u64,
}

fn cache_sizes(state: &AppState) -> CacheSize {
    CacheSize {
        repos: dir_size(state.downloader.download_dir()),
        output: dir_size(state.sandboxes.root()),
    }
}

async fn cache_size(State(state): State<Arc<AppState>>) -> Result<Json<CacheSize>, ApiError> {
    let sizes = blocking(move || Ok(cache_sizes(&state))).await?;
    Ok(Json(sizes))
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    seconds_old: u64,
}

async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<CacheSize>, ApiError> {
    let age = Duration::from_secs(query.seconds_old);
    let sizes = blocking(move || {
        for dir in [state.downloader.download_dir(), state.sandboxes.root()] {
            clear_older_than(dir, age).with_context(|| format!("Failed to clear {:?}", dir))?;
        }
        Ok(cache_sizes(&state))
    })
    .await?;
    Ok(Json(sizes))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    let assignments = blocking(move || {
        state
            .catalog
            .list()
            .with_context(|| format!("Failed to list {:?}", state.catalog.root()))
    })
    .await?;
    Ok(Json(assignments))
}

async fn download_assignment(
    State(state): State<Arc<AppState>>,
    UrlPath(file): UrlPath<String>,
) -> Result<Response, ApiError> {
    let dir = file
        .strip_suffix(".zip")
        .and_then(|name| state.catalog.path(name))
        .ok_or_else(|| ApiError::not_found("Test suite not found"))?;

    let zip_path = blocking(move || archive::ensure_archive(&dir)).await?;
    let bytes = tokio::fs::read(&zip_path)
        .await
        .with_context(|| format!("Failed to read {:?}", zip_path))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    #[serde(default)]
    clean_run: bool,
    #[serde(default = "default_true")]
    pull_if_exists: bool,
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

async fn run_assignment(
    State(state): State<Arc<AppState>>,
    UrlPath((assignment, user)): UrlPath<(String, String)>,
    Query(query): Query<RunQuery>,
) -> Result<Json<AssignmentResults>, ApiError> {
    if !is_plain_name(&user) {
        return Err(ApiError::bad_request("Invalid user"));
    }

    let groups = {
        let state = Arc::clone(&state);
        let assignment = assignment.clone();
        blocking(move || Ok(state.catalog.get(&assignment))).await?
    }
    .ok_or_else(|| ApiError::not_found("Test suite not found"))?;

    let repo = format!("{}-{}", assignment, user);
    let repo_path: PathBuf = state
        .downloader
        .download(&repo, query.pull_if_exists)
        .await
        .map_err(|e| {
            error!("{}", e);
            ApiError::internal("Failed to download repository")
        })?;

    let sandboxes = state
        .sandboxes
        .scoped(Path::new(&assignment).join(&user), !query.clean_run);
    let orchestrator = Orchestrator::new(repo_path, Arc::clone(&state.runner), sandboxes);

    info!("Grading {} for {} ({} groups)", assignment, user, groups.len());
    let results = orchestrator.run(&groups).await;

    Ok(Json(AssignmentResults {
        name: assignment,
        user,
        results,
    }))
}

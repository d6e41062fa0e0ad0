//! Submission repository acquisition
//!
//! Clones `<base_url>/<org>/<repo>.git` into `<download_dir>/<org>/<repo>`,
//! or pulls it when a checkout already exists.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid repository name {0:?}")]
    InvalidName(String),

    #[error("Failed to download repository {repo}: {reason}")]
    Git { repo: String, reason: String },

    #[error("Failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RepositoryDownloader {
    org: String,
    base_url: String,
    download_dir: PathBuf,
}

impl RepositoryDownloader {
    pub fn new(org: impl Into<String>, base_url: impl Into<String>, download_dir: impl AsRef<Path>) -> Self {
        let download_dir = download_dir.as_ref();
        Self {
            org: org.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            download_dir: std::path::absolute(download_dir)
                .unwrap_or_else(|_| download_dir.to_path_buf()),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Local checkout path of `repo`
    pub fn checkout_path(&self, repo: &str) -> PathBuf {
        self.download_dir.join(&self.org).join(repo)
    }

    fn clone_url(&self, repo: &str) -> String {
        format!("{}/{}/{}.git", self.base_url, self.org, repo)
    }

    /// Make `repo` available locally and return its checkout path
    pub async fn download(&self, repo: &str, pull_if_exists: bool) -> Result<PathBuf, DownloadError> {
        if repo.is_empty() || repo.starts_with('.') || repo.contains(['/', '\\']) {
            return Err(DownloadError::InvalidName(repo.to_string()));
        }

        let path = self.checkout_path(repo);
        let parent = self.download_dir.join(&self.org);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|source| DownloadError::Io {
                path: parent.clone(),
                source,
            })?;

        if path.join(".git").exists() {
            if !pull_if_exists {
                info!("Repository {}/{} already downloaded", self.org, repo);
                return Ok(path);
            }
            info!("Pulling repository {}/{}", self.org, repo);
            git(repo, &path, &["pull", "-f"]).await?;
        } else {
            info!("Cloning repository {}/{}", self.org, repo);
            let url = self.clone_url(repo);
            git(repo, &parent, &["clone", &url, repo]).await?;
        }

        info!("Repository {}/{} downloaded", self.org, repo);
        Ok(path)
    }
}

async fn git(repo: &str, cwd: &Path, args: &[&str]) -> Result<(), DownloadError> {
    debug!("git {:?} in {:?}", args, cwd);

    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| DownloadError::Git {
            repo: repo.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(DownloadError::Git {
            repo: repo.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let downloader = RepositoryDownloader::new("IIC2133-PUC", "https://github.com/", "/srv/repos");
        assert_eq!(
            downloader.checkout_path("lab1-alice"),
            PathBuf::from("/srv/repos/IIC2133-PUC/lab1-alice")
        );
        assert_eq!(
            downloader.clone_url("lab1-alice"),
            "https://github.com/IIC2133-PUC/lab1-alice.git"
        );
    }

    #[tokio::test]
    async fn test_existing_checkout_without_pull() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = RepositoryDownloader::new("org", "https://example.invalid", dir.path());
        let checkout = downloader.checkout_path("lab1-alice");
        std::fs::create_dir_all(checkout.join(".git")).unwrap();

        let path = downloader.download("lab1-alice", false).await.unwrap();
        assert_eq!(path, checkout);
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = RepositoryDownloader::new("org", "https://example.invalid", dir.path());

        for name in ["", "../etc", "a/b", ".hidden"] {
            assert!(matches!(
                downloader.download(name, true).await,
                Err(DownloadError::InvalidName(_))
            ));
        }
    }
}

//! Version stamping from the local working tree

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployError;

/// Placeholder version when no tag can be found
pub const DEV_VERSION: &str = "dev";

/// Placeholder commit when the revision cannot be read
pub const UNKNOWN_COMMIT: &str = "unknown";

/// Source-control queries the deployer needs
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Most recent tag reachable from HEAD
    async fn latest_tag(&self) -> Result<String, DeployError>;

    /// Abbreviated HEAD revision
    async fn short_commit(&self) -> Result<String, DeployError>;

    /// One-line log of the commits in `from..to`
    async fn log_range(&self, from: &str, to: &str) -> Result<String, DeployError>;
}

/// `git` on the PATH, run inside a working tree
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String, DeployError> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .current_dir(&self.repo)
            .args(args)
            .output()
            .await
            .map_err(|e| DeployError::SourceControlError(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::SourceControlError(format!(
                "git {} failed (exit {}): {}",
                args.join(" "),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn latest_tag(&self) -> Result<String, DeployError> {
        self.run_git(&["describe", "--tags", "--abbrev=0"]).await
    }

    async fn short_commit(&self) -> Result<String, DeployError> {
        self.run_git(&["rev-parse", "--short", "HEAD"]).await
    }

    async fn log_range(&self, from: &str, to: &str) -> Result<String, DeployError> {
        let range = format!("{from}..{to}");
        self.run_git(&["log", "--oneline", "--no-decorate", &range]).await
    }
}

/// Values embedded into a build and reported back on `/version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStamp {
    pub version: String,
    pub commit: String,
    pub build_time: String,
}

impl BuildStamp {
    /// Link-time constant overrides for the given package
    pub fn ldflags(&self, package: &str) -> String {
        format!(
            "-s -w -X {package}.Version={} -X {package}.Commit={} -X {package}.BuildTime={}",
            self.version, self.commit, self.build_time
        )
    }
}

/// Derive the build stamp. Never fails; degrades to placeholders.
pub async fn stamp(source: &dyn SourceControl) -> BuildStamp {
    BuildStamp {
        version: resolve_version(source).await,
        commit: resolve_commit(source).await,
        build_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Most recent tag, or `dev`
pub async fn resolve_version(source: &dyn SourceControl) -> String {
    match source.latest_tag().await {
        Ok(tag) if !tag.is_empty() => tag,
        Ok(_) => DEV_VERSION.to_string(),
        Err(e) => {
            warn!("No version tag, using {}: {}", DEV_VERSION, e);
            DEV_VERSION.to_string()
        }
    }
}

async fn resolve_commit(source: &dyn SourceControl) -> String {
    match source.short_commit().await {
        Ok(commit) if !commit.is_empty() => commit,
        Ok(_) => UNKNOWN_COMMIT.to_string(),
        Err(e) => {
            warn!("Unable to read commit, using {}: {}", UNKNOWN_COMMIT, e);
            UNKNOWN_COMMIT.to_string()
        }
    }
}

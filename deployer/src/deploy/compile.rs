//! Cross-compilation of service binaries

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::stamp::BuildStamp;
use crate::errors::DeployError;
use crate::fleet::services::ServiceDefinition;

/// Produces a deployable artifact for a service
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build the service for its target and return the artifact path
    async fn build(
        &self,
        service: &ServiceDefinition,
        stamp: &BuildStamp,
    ) -> Result<PathBuf, DeployError>;
}

/// Static Go builds, cross-compiled through `GOOS`/`GOARCH`
#[derive(Debug, Clone)]
pub struct GoToolchain {
    source_root: PathBuf,
    out_dir: PathBuf,
    stamp_package: String,
}

impl GoToolchain {
    pub fn new(source_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            out_dir: out_dir.into(),
            stamp_package: "main".to_string(),
        }
    }

    /// Where the artifact for `service` is written
    pub fn artifact_path(&self, service: &ServiceDefinition) -> PathBuf {
        artifact_path(&self.source_root, &self.out_dir, service)
    }
}

/// `<root>/<out_dir>/<artifact>-<os>-<arch>`
pub fn artifact_path(source_root: &Path, out_dir: &Path, service: &ServiceDefinition) -> PathBuf {
    source_root.join(out_dir).join(format!(
        "{}-{}-{}",
        service.artifact_name, service.target_os, service.target_arch
    ))
}

#[async_trait]
impl Builder for GoToolchain {
    async fn build(
        &self,
        service: &ServiceDefinition,
        stamp: &BuildStamp,
    ) -> Result<PathBuf, DeployError> {
        let output_path = self.artifact_path(service);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(
            "Building {} for {}/{} ({} @ {})",
            service.name, service.target_os, service.target_arch, stamp.version, stamp.commit
        );

        let ldflags = stamp.ldflags(&self.stamp_package);
        let package = format!("./{}", service.source_dir.trim_start_matches("./"));
        let output_arg = output_path.to_string_lossy().to_string();
        debug!("go build -ldflags '{}' -o {} {}", ldflags, output_arg, package);

        let output = Command::new("go")
            .current_dir(&self.source_root)
            .env("GOOS", &service.target_os)
            .env("GOARCH", &service.target_arch)
            .env("CGO_ENABLED", "0")
            .args(["build", "-trimpath", "-ldflags", &ldflags, "-o", &output_arg, &package])
            .output()
            .await
            .map_err(|e| DeployError::BuildError {
                service: service.name.clone(),
                output: format!("failed to run go build: {e}"),
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(DeployError::BuildError {
                service: service.name.clone(),
                output: combined.trim().to_string(),
            });
        }

        info!("Built {}", output_path.display());
        Ok(output_path)
    }
}

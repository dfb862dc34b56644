//! Backup, upload and atomic install on the target host

use std::path::Path;

use tracing::{info, warn};

use crate::deploy::remote::{RemoteCommand, RemoteHost, BACKUP_TAKEN_MARKER};
use crate::errors::DeployError;
use crate::fleet::services::ServiceDefinition;

/// Preserve the live binary as `<install_path>.prev`.
///
/// Returns whether a backup was taken. A missing live binary (first deploy)
/// is not an error.
pub async fn backup(
    remote: &dyn RemoteHost,
    host: &str,
    service: &ServiceDefinition,
) -> Result<bool, DeployError> {
    let output = remote
        .exec(
            host,
            &RemoteCommand::Backup {
                install_path: service.install_path.clone(),
            },
        )
        .await?;

    let taken = output.lines().any(|line| line.trim() == BACKUP_TAKEN_MARKER);
    if taken {
        info!("Backed up {} to {}", service.install_path, service.backup_path());
    } else {
        warn!(
            "No existing binary at {} on {}, first deploy has no rollback point",
            service.install_path, host
        );
    }
    Ok(taken)
}

/// Copy the artifact to `<install_path>.new`
pub async fn upload(
    remote: &dyn RemoteHost,
    host: &str,
    service: &ServiceDefinition,
    artifact: &Path,
) -> Result<(), DeployError> {
    let staged = service.staged_path();
    info!("Uploading {} to {}:{}", artifact.display(), host, staged);
    remote.upload(artifact, host, &staged).await
}

/// Make the staged binary executable and rename it over the live path
pub async fn install(
    remote: &dyn RemoteHost,
    host: &str,
    service: &ServiceDefinition,
) -> Result<(), DeployError> {
    remote
        .exec(
            host,
            &RemoteCommand::Install {
                install_path: service.install_path.clone(),
            },
        )
        .await?;
    info!("Installed {} on {}", service.install_path, host);
    Ok(())
}

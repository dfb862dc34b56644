//! Restoring the previous binary after a failed verification

use tracing::{error, info, warn};

use crate::deploy::activation::restart_native;
use crate::deploy::remote::{RemoteCommand, RemoteHost};
use crate::errors::DeployError;
use crate::fleet::services::ServiceDefinition;

/// Rename `<install_path>.prev` back over the live path and restart.
///
/// Only meaningful for natively supervised services.
pub async fn rollback(
    service: &ServiceDefinition,
    host: &str,
    remote: &dyn RemoteHost,
    backup_taken: bool,
) -> Result<(), DeployError> {
    if !service.activation.is_native() {
        return Err(DeployError::Internal(format!(
            "{} is scheduler-managed and is never rolled back here",
            service.name
        )));
    }

    if !backup_taken {
        return Err(DeployError::TransportError {
            operation: "restore".to_string(),
            host: host.to_string(),
            message: format!("no backup of {} was taken", service.install_path),
        });
    }

    warn!("Rolling back {} on {}", service.name, host);

    remote
        .exec(
            host,
            &RemoteCommand::Restore {
                install_path: service.install_path.clone(),
            },
        )
        .await
        .map_err(|e| {
            error!("Restore of {} failed: {}", service.install_path, e);
            e
        })?;

    restart_native(service, host, remote).await?;

    info!("Rolled back {} to its previous binary", service.name);
    Ok(())
}

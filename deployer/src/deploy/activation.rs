//! Activation backends: native supervisor restart or scheduler submission

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::remote::{RemoteCommand, RemoteHost};
use crate::errors::DeployError;
use crate::fleet::services::{Activation, ServiceDefinition};

/// Default scheduler address when `NOMAD_ADDR` is not set
pub const DEFAULT_SCHEDULER_ADDRESS: &str = "http://127.0.0.1:4646";

/// Status string the scheduler reports for a healthy job
pub const JOB_RUNNING: &str = "running";

/// Cluster scheduler client
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit a job specification. Returns once the submission is accepted.
    async fn submit(&self, job_spec: &Path) -> Result<(), DeployError>;

    /// Short-form status of a job, e.g. `running` or `pending`
    async fn job_status(&self, job_name: &str) -> Result<String, DeployError>;
}

/// The `nomad` CLI
#[derive(Debug, Clone)]
pub struct NomadCli {
    address: String,
}

impl NomadCli {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn run_nomad(&self, args: &[&str]) -> Result<String, DeployError> {
        debug!("nomad {} (NOMAD_ADDR={})", args.join(" "), self.address);
        let output = Command::new("nomad")
            .env("NOMAD_ADDR", &self.address)
            .args(args)
            .output()
            .await
            .map_err(|e| DeployError::SchedulerError(format!("failed to run nomad: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::SchedulerError(format!(
                "nomad {} failed (exit {}): {}",
                args.join(" "),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Scheduler for NomadCli {
    async fn submit(&self, job_spec: &Path) -> Result<(), DeployError> {
        let spec = job_spec.to_string_lossy();
        self.run_nomad(&["job", "run", "-detach", &spec]).await?;
        Ok(())
    }

    async fn job_status(&self, job_name: &str) -> Result<String, DeployError> {
        let output = self.run_nomad(&["job", "status", "-short", job_name]).await?;
        parse_job_status(&output).ok_or_else(|| {
            DeployError::SchedulerError(format!("no status reported for job {job_name}"))
        })
    }
}

/// Pull the `Status = ...` field out of `nomad job status -short` output
pub fn parse_job_status(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "Status").then(|| value.trim().to_lowercase())
    })
}

/// Bring the freshly installed binary into service
pub async fn activate(
    service: &ServiceDefinition,
    host: &str,
    remote: &dyn RemoteHost,
    scheduler: &dyn Scheduler,
    source_root: &Path,
) -> Result<(), DeployError> {
    match &service.activation {
        Activation::Native { manager, unit } => {
            info!("Restarting {} via {} on {}", unit, manager, host);
            restart_native(service, host, remote).await
        }
        Activation::Scheduled { job_spec_path, job_name } => {
            let spec: PathBuf = source_root.join(job_spec_path);
            info!("Submitting job {} from {}", job_name, spec.display());
            scheduler.submit(&spec).await
        }
    }
}

/// Issue the supervisor restart. Scheduled services have no native unit.
pub async fn restart_native(
    service: &ServiceDefinition,
    host: &str,
    remote: &dyn RemoteHost,
) -> Result<(), DeployError> {
    match &service.activation {
        Activation::Native { manager, unit } => {
            remote
                .exec(
                    host,
                    &RemoteCommand::Restart {
                        manager: *manager,
                        unit: unit.clone(),
                    },
                )
                .await?;
            Ok(())
        }
        Activation::Scheduled { .. } => Err(DeployError::Internal(format!(
            "{} is scheduler-managed and has no native unit to restart",
            service.name
        ))),
    }
}

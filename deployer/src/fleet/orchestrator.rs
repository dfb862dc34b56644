//! Fleet-level operations: single and full-fleet deploys, status

use serde::Serialize;
use tracing::{error, info, warn};

use crate::deploy::attempt::DeploymentAttempt;
use crate::deploy::pipeline::{DeployPlan, Pipeline};
use crate::deploy::remote::RemoteCommand;
use crate::errors::DeployError;
use crate::fleet::services::{Activation, ServiceRegistry};

/// Status rendered when a native probe fails
pub const NOT_RUNNING: &str = "not running";

/// Status rendered when a scheduler probe fails
pub const NOT_FOUND: &str = "not found";

/// One line of `deploy --status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub service: String,
    pub host: String,
    pub manager: String,
    pub status: String,
}

/// Sequences the pipeline across the fleet
pub struct Orchestrator {
    registry: ServiceRegistry,
    pipeline: Pipeline,
}

impl Orchestrator {
    pub fn new(registry: ServiceRegistry, pipeline: Pipeline) -> Self {
        Self { registry, pipeline }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Deploy one named service
    pub async fn deploy_one(&self, name: &str) -> Result<DeploymentAttempt, DeployError> {
        let service = self.registry.get(name)?;
        self.pipeline.deploy(service).await
    }

    /// Deploy every service in the fixed order, stopping at the first failure
    pub async fn deploy_all(&self) -> Result<Vec<DeploymentAttempt>, DeployError> {
        let services = self.registry.in_order();
        let total = services.len();
        let mut deployed = Vec::with_capacity(total);

        for (i, service) in services.into_iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, service.name);
            match self.pipeline.deploy(service).await {
                Ok(attempt) => deployed.push(attempt),
                Err(e) => {
                    let skipped: Vec<&str> = self.registry.names()[i + 1..]
                        .iter()
                        .map(String::as_str)
                        .collect();
                    error!(
                        "Fleet deploy stopped at {}; not attempted: {}",
                        service.name,
                        if skipped.is_empty() { "none".to_string() } else { skipped.join(", ") }
                    );
                    return Err(e);
                }
            }
        }

        info!("Fleet deploy complete ({} services)", total);
        Ok(deployed)
    }

    /// Dry-run plan for one service, or the whole fleet for `all`
    pub fn plan(&self, target: &str) -> Result<Vec<DeployPlan>, DeployError> {
        if target == "all" {
            return Ok(self
                .registry
                .in_order()
                .into_iter()
                .map(|s| self.pipeline.plan(s))
                .collect());
        }
        let service = self.registry.get(target)?;
        Ok(vec![self.pipeline.plan(service)])
    }

    /// Probe every service. Individual probe failures never fail the batch.
    pub async fn status(&self) -> Vec<StatusRow> {
        let caps = self.pipeline.capabilities();
        let mut rows = Vec::new();

        for service in self.registry.in_order() {
            let host = service.host();
            let status = match &service.activation {
                Activation::Native { manager, unit } => {
                    let command = RemoteCommand::IsActive {
                        manager: *manager,
                        unit: unit.clone(),
                    };
                    match caps.remote.exec(&host, &command).await {
                        Ok(output) if !output.trim().is_empty() => output.trim().to_string(),
                        Ok(_) => NOT_RUNNING.to_string(),
                        Err(e) => {
                            warn!("Status probe for {} failed: {}", service.name, e);
                            NOT_RUNNING.to_string()
                        }
                    }
                }
                Activation::Scheduled { job_name, .. } => {
                    match caps.scheduler.job_status(job_name).await {
                        Ok(status) => status,
                        Err(e) => {
                            warn!("Status probe for {} failed: {}", service.name, e);
                            NOT_FOUND.to_string()
                        }
                    }
                }
            };

            rows.push(StatusRow {
                service: service.name.clone(),
                host,
                manager: service.activation.manager_name(),
                status,
            });
        }

        rows
    }
}

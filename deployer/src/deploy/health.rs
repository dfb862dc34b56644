//! Post-activation verification

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::app::options::VerifyOptions;
use crate::deploy::activation::{Scheduler, JOB_RUNNING};
use crate::deploy::stamp::UNKNOWN_COMMIT;
use crate::errors::DeployError;
use crate::fleet::services::{Activation, ServiceDefinition};

/// Body served on `/version` by every fleet binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReport {
    pub commit: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default, alias = "buildTime")]
    pub build_time: Option<String>,
}

/// HTTP access to a service's health and version endpoints
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Status code returned by `GET <base>/health`
    async fn health(&self, base_url: &str) -> Result<u16, DeployError>;

    /// Parsed body of `GET <base>/version`
    async fn version(&self, base_url: &str) -> Result<VersionReport, DeployError>;
}

/// reqwest-backed probe
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, DeployError> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn health(&self, base_url: &str) -> Result<u16, DeployError> {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        Ok(response.status().as_u16())
    }

    async fn version(&self, base_url: &str) -> Result<VersionReport, DeployError> {
        let url = format!("{}/version", base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let report = response.json().await?;
        Ok(report)
    }
}

/// Verify the newly activated service, choosing the check by backend
pub async fn verify(
    service: &ServiceDefinition,
    host: &str,
    expected_commit: &str,
    probe: &dyn HealthProbe,
    scheduler: &dyn Scheduler,
    options: &VerifyOptions,
) -> Result<(), DeployError> {
    match &service.activation {
        Activation::Native { .. } => {
            verify_native(
                probe,
                &service.name,
                &service.health_base_url(host),
                expected_commit,
                options.native_timeout,
                options.poll_interval,
            )
            .await
        }
        Activation::Scheduled { job_name, .. } => {
            verify_scheduled(
                scheduler,
                &service.name,
                job_name,
                options.scheduled_timeout,
                options.poll_interval,
            )
            .await
        }
    }
}

/// Poll `/health` until it answers 200, then cross-check the served commit.
/// Every probe is cut off at the deadline.
pub async fn verify_native(
    probe: &dyn HealthProbe,
    service: &str,
    base_url: &str,
    expected_commit: &str,
    bound: Duration,
    interval: Duration,
) -> Result<(), DeployError> {
    info!("Waiting for {} to report healthy at {}", service, base_url);
    let deadline = Instant::now() + bound;

    loop {
        match timeout_at(deadline, probe.health(base_url)).await {
            Ok(Ok(200)) => {
                check_commit(probe, service, base_url, expected_commit, deadline, bound).await?;
                info!("{} is healthy", service);
                return Ok(());
            }
            Ok(Ok(status)) => debug!("{} health returned {}", service, status),
            Ok(Err(e)) => debug!("{} health probe failed: {}", service, e),
            Err(_) => debug!("{} health probe did not answer before the deadline", service),
        }

        wait_for_next_poll(deadline, interval)
            .await
            .ok_or_else(|| timed_out(service, bound))?;
    }
}

// A healthy response from a process that never restarted would still report
// the old commit.
async fn check_commit(
    probe: &dyn HealthProbe,
    service: &str,
    base_url: &str,
    expected_commit: &str,
    deadline: Instant,
    bound: Duration,
) -> Result<(), DeployError> {
    if expected_commit.is_empty() || expected_commit == UNKNOWN_COMMIT {
        debug!("No expected commit for {}, skipping version check", service);
        return Ok(());
    }

    let report = timeout_at(deadline, probe.version(base_url))
        .await
        .map_err(|_| timed_out(service, bound))?
        .map_err(|e| DeployError::VerificationFailed {
            service: service.to_string(),
            message: format!("unable to read /version: {e}"),
        })?;

    if report.commit != expected_commit {
        return Err(DeployError::CommitMismatch {
            service: service.to_string(),
            expected: expected_commit.to_string(),
            actual: report.commit,
        });
    }
    Ok(())
}

/// Poll the scheduler until the job reports `running`
pub async fn verify_scheduled(
    scheduler: &dyn Scheduler,
    service: &str,
    job_name: &str,
    bound: Duration,
    interval: Duration,
) -> Result<(), DeployError> {
    info!("Waiting for job {} to be {}", job_name, JOB_RUNNING);
    let deadline = Instant::now() + bound;

    loop {
        match timeout_at(deadline, scheduler.job_status(job_name)).await {
            Ok(Ok(status)) if status == JOB_RUNNING => {
                info!("Job {} is running", job_name);
                return Ok(());
            }
            Ok(Ok(status)) => debug!("Job {} status: {}", job_name, status),
            Ok(Err(e)) => debug!("Job {} status query failed: {}", job_name, e),
            Err(_) => debug!("Job {} status query did not answer before the deadline", job_name),
        }

        wait_for_next_poll(deadline, interval)
            .await
            .ok_or_else(|| timed_out(service, bound))?;
    }
}

/// Sleep until the next poll, never past the deadline. `None` once it has passed.
async fn wait_for_next_poll(deadline: Instant, interval: Duration) -> Option<()> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return None;
    }
    tokio::time::sleep(interval.min(remaining)).await;
    Some(())
}

fn timed_out(service: &str, bound: Duration) -> DeployError {
    DeployError::VerificationTimeout {
        service: service.to_string(),
        bound,
    }
}

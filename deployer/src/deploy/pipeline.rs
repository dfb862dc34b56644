//! Single-service deployment pipeline: build, transfer, activate, verify

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::app::options::DeployOptions;
use crate::deploy::activation::{activate, NomadCli, Scheduler};
use crate::deploy::attempt::{AttemptEvent, DeploymentAttempt};
use crate::deploy::compile::{artifact_path, Builder, GoToolchain};
use crate::deploy::health::{verify, HealthProbe, HttpProbe};
use crate::deploy::remote::{RemoteCommand, RemoteHost, SshRemote};
use crate::deploy::rollback::rollback;
use crate::deploy::stamp::{stamp, GitCli, SourceControl};
use crate::deploy::transfer;
use crate::errors::DeployError;
use crate::fleet::services::{Activation, ServiceDefinition};

/// External tools the pipeline drives
#[derive(Clone)]
pub struct Capabilities {
    pub source: Arc<dyn SourceControl>,
    pub builder: Arc<dyn Builder>,
    pub remote: Arc<dyn RemoteHost>,
    pub scheduler: Arc<dyn Scheduler>,
    pub probe: Arc<dyn HealthProbe>,
}

impl Capabilities {
    /// Real git, go, ssh/scp, nomad and HTTP
    pub fn system(options: &DeployOptions) -> Result<Self, DeployError> {
        Ok(Self {
            source: Arc::new(GitCli::new(&options.source_root)),
            builder: Arc::new(GoToolchain::new(&options.source_root, &options.build_dir)),
            remote: Arc::new(SshRemote::new(options.ssh_user.clone())),
            scheduler: Arc::new(NomadCli::new(options.scheduler_address.clone())),
            probe: Arc::new(HttpProbe::new()?),
        })
    }
}

/// What a deploy of one service would do
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    pub service: String,
    pub host: String,
    pub target: String,
    pub artifact: PathBuf,
    pub upload_to: String,
    pub activation: String,
    pub verification: String,
}

/// Runs the pipeline for one service at a time
pub struct Pipeline {
    caps: Capabilities,
    options: DeployOptions,
}

impl Pipeline {
    pub fn new(caps: Capabilities, options: DeployOptions) -> Self {
        Self { caps, options }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Deploy a single service. Any stage error aborts the remaining stages.
    ///
    /// On a failed verification natively supervised services are rolled
    /// back; the result is still an error.
    pub async fn deploy(
        &self,
        service: &ServiceDefinition,
    ) -> Result<DeploymentAttempt, DeployError> {
        let host = service.host();
        info!(
            "Deploying {} to {} ({})",
            service.name,
            host,
            service.activation.manager_name()
        );

        let stamp = stamp(self.caps.source.as_ref()).await;
        let mut attempt = DeploymentAttempt::new(&service.name, &stamp.commit);

        attempt.process(AttemptEvent::Start)?;
        let artifact = match self.caps.builder.build(service, &stamp).await {
            Ok(path) => path,
            Err(e) => return Err(abort(&mut attempt, e)),
        };
        attempt.process(AttemptEvent::Built)?;

        if let Err(e) = self.transfer(&mut attempt, service, &host, &artifact).await {
            return Err(abort(&mut attempt, e));
        }
        attempt.process(AttemptEvent::Installed)?;

        if let Err(e) = activate(
            service,
            &host,
            self.caps.remote.as_ref(),
            self.caps.scheduler.as_ref(),
            &self.options.source_root,
        )
        .await
        {
            return Err(abort(&mut attempt, e));
        }
        attempt.process(AttemptEvent::Activated)?;

        match verify(
            service,
            &host,
            attempt.expected_commit(),
            self.caps.probe.as_ref(),
            self.caps.scheduler.as_ref(),
            &self.options.verify,
        )
        .await
        {
            Ok(()) => {
                attempt.process(AttemptEvent::Verified)?;
                info!("Deployed {} at {}", service.name, attempt.expected_commit());
                Ok(attempt)
            }
            Err(e) => Err(self.recover(&mut attempt, service, &host, e).await),
        }
    }

    async fn transfer(
        &self,
        attempt: &mut DeploymentAttempt,
        service: &ServiceDefinition,
        host: &str,
        artifact: &Path,
    ) -> Result<(), DeployError> {
        let remote = self.caps.remote.as_ref();
        if transfer::backup(remote, host, service).await? {
            attempt.process(AttemptEvent::BackupTaken)?;
        }
        transfer::upload(remote, host, service, artifact).await?;
        transfer::install(remote, host, service).await
    }

    async fn recover(
        &self,
        attempt: &mut DeploymentAttempt,
        service: &ServiceDefinition,
        host: &str,
        cause: DeployError,
    ) -> DeployError {
        error!("Verification of {} failed: {}", service.name, cause);

        // The scheduler owns the job's lifecycle from here.
        if !service.activation.is_native() {
            let _ = attempt.process(AttemptEvent::Fail(cause.to_string()));
            return cause;
        }

        if let Err(e) = attempt.process(AttemptEvent::BeginRollback) {
            return e;
        }

        match rollback(service, host, self.caps.remote.as_ref(), attempt.backup_taken()).await {
            Ok(()) => {
                let _ = attempt.process(AttemptEvent::RollbackComplete);
                DeployError::RolledBack {
                    service: service.name.clone(),
                    cause: Box::new(cause),
                }
            }
            Err(rollback_err) => {
                error!("Rollback of {} failed: {}", service.name, rollback_err);
                let _ = attempt.process(AttemptEvent::Fail(rollback_err.to_string()));
                DeployError::RollbackFailed {
                    service: service.name.clone(),
                    cause: Box::new(cause),
                    rollback: Box::new(rollback_err),
                }
            }
        }
    }

    /// Describe what [`Pipeline::deploy`] would do, without running anything
    pub fn plan(&self, service: &ServiceDefinition) -> DeployPlan {
        let host = service.host();
        let verify = &self.options.verify;

        let (activation, verification) = match &service.activation {
            Activation::Native { manager, unit } => (
                RemoteCommand::Restart {
                    manager: *manager,
                    unit: unit.clone(),
                }
                .to_shell(),
                format!(
                    "GET {}/health + /version (timeout {}s)",
                    service.health_base_url(&host),
                    verify.native_timeout.as_secs()
                ),
            ),
            Activation::Scheduled { job_spec_path, job_name } => (
                format!(
                    "nomad job run -detach {}",
                    self.options.source_root.join(job_spec_path).display()
                ),
                format!(
                    "job {} running (timeout {}s)",
                    job_name,
                    verify.scheduled_timeout.as_secs()
                ),
            ),
        };

        DeployPlan {
            service: service.name.clone(),
            host: host.clone(),
            target: format!("{}/{}", service.target_os, service.target_arch),
            artifact: artifact_path(&self.options.source_root, &self.options.build_dir, service),
            upload_to: format!("{}:{}", host, service.staged_path()),
            activation,
            verification,
        }
    }
}

fn abort(attempt: &mut DeploymentAttempt, err: DeployError) -> DeployError {
    let stage = attempt.stage();
    error!("{} of {} failed: {}", stage, attempt.service(), err);
    let _ = attempt.process(AttemptEvent::Fail(err.to_string()));
    DeployError::Stage {
        service: attempt.service().to_string(),
        stage,
        source: Box::new(err),
    }
}

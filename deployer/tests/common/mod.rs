//! Fakes for the deployer's capability traits

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fleet_deploy::app::options::DeployOptions;
use fleet_deploy::deploy::activation::Scheduler;
use fleet_deploy::deploy::compile::Builder;
use fleet_deploy::deploy::health::{HealthProbe, VersionReport};
use fleet_deploy::deploy::pipeline::{Capabilities, Pipeline};
use fleet_deploy::deploy::remote::{RemoteCommand, RemoteHost, BACKUP_TAKEN_MARKER};
use fleet_deploy::deploy::stamp::{BuildStamp, SourceControl};
use fleet_deploy::errors::DeployError;
use fleet_deploy::fleet::orchestrator::Orchestrator;
use fleet_deploy::fleet::services::{
    Activation, ProcessManager, ServiceDefinition, ServiceRegistry,
};

pub const COMMIT: &str = "9f3c2a1";
pub const OLD_COMMIT: &str = "17be0c2";

/// Ordered record of every external action taken
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct FakeSource;

#[async_trait]
impl SourceControl for FakeSource {
    async fn latest_tag(&self) -> Result<String, DeployError> {
        Ok("v1.4.2".to_string())
    }

    async fn short_commit(&self) -> Result<String, DeployError> {
        Ok(COMMIT.to_string())
    }

    async fn log_range(&self, from: &str, to: &str) -> Result<String, DeployError> {
        Ok(format!("{to} Change since {from}"))
    }
}

/// Writes `build:<service>:<commit>` into a temp dir as the artifact
pub struct FakeBuilder {
    dir: tempfile::TempDir,
    journal: Journal,
    fail_for: Option<String>,
}

impl FakeBuilder {
    pub fn new(journal: Journal) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            journal,
            fail_for: None,
        }
    }

    pub fn failing_for(mut self, service: &str) -> Self {
        self.fail_for = Some(service.to_string());
        self
    }
}

pub fn artifact_bytes(service: &str) -> Vec<u8> {
    format!("build:{service}:{COMMIT}").into_bytes()
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn build(
        &self,
        service: &ServiceDefinition,
        stamp: &BuildStamp,
    ) -> Result<PathBuf, DeployError> {
        self.journal.push(format!("build {}", service.name));
        if self.fail_for.as_deref() == Some(service.name.as_str()) {
            return Err(DeployError::BuildError {
                service: service.name.clone(),
                output: "undefined: frobnicate".to_string(),
            });
        }
        assert_eq!(stamp.commit, COMMIT);
        let path = self.dir.path().join(&service.artifact_name);
        std::fs::write(&path, artifact_bytes(&service.name)).unwrap();
        Ok(path)
    }
}

/// Remote hosts with an in-memory filesystem keyed by `(host, path)`
#[derive(Default)]
pub struct FakeHost {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    journal: Journal,
    fail_restore: bool,
    fail_status: HashSet<String>,
    status: HashMap<String, String>,
}

impl FakeHost {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn with_file(self, host: &str, path: &str, contents: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert((host.to_string(), path.to_string()), contents.to_vec());
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn with_status(mut self, unit: &str, status: &str) -> Self {
        self.status.insert(unit.to_string(), status.to_string());
        self
    }

    pub fn failing_status(mut self, unit: &str) -> Self {
        self.fail_status.insert(unit.to_string());
        self
    }

    pub fn file(&self, host: &str, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(host.to_string(), path.to_string()))
            .cloned()
    }

    fn rename(&self, host: &str, from: &str, to: &str) -> bool {
        let mut files = self.files.lock().unwrap();
        match files.remove(&(host.to_string(), from.to_string())) {
            Some(contents) => {
                files.insert((host.to_string(), to.to_string()), contents);
                true
            }
            None => false,
        }
    }

    fn transport_error(command: &RemoteCommand, host: &str, message: &str) -> DeployError {
        DeployError::TransportError {
            operation: command.operation().to_string(),
            host: host.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl RemoteHost for FakeHost {
    async fn exec(&self, host: &str, command: &RemoteCommand) -> Result<String, DeployError> {
        match command {
            RemoteCommand::Backup { install_path } => {
                self.journal.push(format!("backup {host}"));
                let prev = format!("{install_path}.prev");
                let mut files = self.files.lock().unwrap();
                match files.get(&(host.to_string(), install_path.clone())).cloned() {
                    Some(contents) => {
                        files.insert((host.to_string(), prev), contents);
                        Ok(BACKUP_TAKEN_MARKER.to_string())
                    }
                    None => {
                        files.remove(&(host.to_string(), prev));
                        Ok("no-backup".to_string())
                    }
                }
            }
            RemoteCommand::Install { install_path } => {
                self.journal.push(format!("install {host}"));
                let staged = format!("{install_path}.new");
                if self.rename(host, &staged, install_path) {
                    Ok(String::new())
                } else {
                    Err(Self::transport_error(command, host, "mv: cannot stat"))
                }
            }
            RemoteCommand::Restore { install_path } => {
                self.journal.push(format!("restore {host}"));
                if self.fail_restore {
                    return Err(Self::transport_error(command, host, "Permission denied"));
                }
                let prev = format!("{install_path}.prev");
                if self.rename(host, &prev, install_path) {
                    Ok(String::new())
                } else {
                    Err(Self::transport_error(command, host, "no backup"))
                }
            }
            RemoteCommand::Restart { unit, .. } => {
                self.journal.push(format!("restart {unit}"));
                Ok(String::new())
            }
            RemoteCommand::IsActive { unit, .. } => {
                self.journal.push(format!("is-active {unit}"));
                if self.fail_status.contains(unit) {
                    return Err(Self::transport_error(command, host, "Connection refused"));
                }
                Ok(self.status.get(unit).cloned().unwrap_or_else(|| "active".to_string()))
            }
        }
    }

    async fn upload(
        &self,
        local: &Path,
        host: &str,
        remote_path: &str,
    ) -> Result<(), DeployError> {
        self.journal.push(format!("upload {host}"));
        let contents = std::fs::read(local)?;
        self.files
            .lock()
            .unwrap()
            .insert((host.to_string(), remote_path.to_string()), contents);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeScheduler {
    journal: Journal,
    statuses: HashMap<String, String>,
    fail_status: bool,
}

impl FakeScheduler {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, job: &str, status: &str) -> Self {
        self.statuses.insert(job.to_string(), status.to_string());
        self
    }

    pub fn failing_status(mut self) -> Self {
        self.fail_status = true;
        self
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn submit(&self, job_spec: &Path) -> Result<(), DeployError> {
        self.journal.push(format!("submit {}", job_spec.display()));
        Ok(())
    }

    async fn job_status(&self, job_name: &str) -> Result<String, DeployError> {
        self.journal.push(format!("job-status {job_name}"));
        if self.fail_status {
            return Err(DeployError::SchedulerError("connection refused".to_string()));
        }
        Ok(self
            .statuses
            .get(job_name)
            .cloned()
            .unwrap_or_else(|| "running".to_string()))
    }
}

/// Healthy endpoints serving a fixed commit; listed base URLs never come up
#[derive(Default)]
pub struct FakeProbe {
    journal: Journal,
    serving: HashMap<String, String>,
    down: HashSet<String>,
}

impl FakeProbe {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn serving(mut self, base_url: &str, commit: &str) -> Self {
        self.serving.insert(base_url.to_string(), commit.to_string());
        self
    }

    pub fn down(mut self, base_url: &str) -> Self {
        self.down.insert(base_url.to_string());
        self
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn health(&self, base_url: &str) -> Result<u16, DeployError> {
        self.journal.push(format!("health {base_url}"));
        if self.down.contains(base_url) {
            Ok(503)
        } else {
            Ok(200)
        }
    }

    async fn version(&self, base_url: &str) -> Result<VersionReport, DeployError> {
        self.journal.push(format!("version {base_url}"));
        Ok(VersionReport {
            commit: self
                .serving
                .get(base_url)
                .cloned()
                .unwrap_or_else(|| COMMIT.to_string()),
            version: Some("v1.4.2".to_string()),
            build_time: None,
        })
    }
}

pub fn capabilities(
    builder: FakeBuilder,
    host: Arc<FakeHost>,
    scheduler: FakeScheduler,
    probe: FakeProbe,
) -> Capabilities {
    Capabilities {
        source: Arc::new(FakeSource),
        builder: Arc::new(builder),
        remote: host,
        scheduler: Arc::new(scheduler),
        probe: Arc::new(probe),
    }
}

pub fn orchestrator(registry: ServiceRegistry, caps: Capabilities) -> Orchestrator {
    Orchestrator::new(registry, Pipeline::new(caps, DeployOptions::default()))
}

/// A natively supervised service named `name`
pub fn native_service(name: &str) -> ServiceDefinition {
    ServiceDefinition {
        name: name.to_string(),
        target_os: "linux".to_string(),
        target_arch: "amd64".to_string(),
        source_dir: format!("cmd/{name}"),
        artifact_name: name.to_string(),
        host: format!("{name}.test"),
        host_env: format!("FLEET_TEST_{}_HOST", name.to_uppercase().replace('-', "_")),
        install_path: format!("/usr/local/bin/{name}"),
        activation: Activation::Native {
            manager: ProcessManager::Systemd,
            unit: format!("{name}.service"),
        },
        health_port: 9000,
    }
}

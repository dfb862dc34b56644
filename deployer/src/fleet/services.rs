//! Compiled-in service definitions and the fixed deploy order

use std::fmt;

use serde::Serialize;

use crate::errors::DeployError;

/// Services in dependency order. Workers must not come up against a gateway
/// they don't expect, and the coordinator talks to both.
pub const DEPLOY_ORDER: &[&str] = &["gateway", "worker", "ai-coordinator"];

/// Native process supervisor flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessManager {
    Systemd,
    Launchd,
}

impl fmt::Display for ProcessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessManager::Systemd => write!(f, "systemd"),
            ProcessManager::Launchd => write!(f, "launchd"),
        }
    }
}

/// How a freshly installed binary is brought into service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Activation {
    /// Restart through the host's own supervisor
    Native {
        manager: ProcessManager,
        unit: String,
    },

    /// Submit a job spec to the cluster scheduler
    Scheduled {
        job_spec_path: String,
        job_name: String,
    },
}

impl Activation {
    pub fn is_native(&self) -> bool {
        matches!(self, Activation::Native { .. })
    }

    /// Short name of whatever manages the process
    pub fn manager_name(&self) -> String {
        match self {
            Activation::Native { manager, .. } => manager.to_string(),
            Activation::Scheduled { .. } => "nomad".to_string(),
        }
    }
}

/// Static per-service deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub target_os: String,
    pub target_arch: String,
    pub source_dir: String,
    pub artifact_name: String,
    pub host: String,
    /// Environment variable that replaces `host` when set
    pub host_env: String,
    pub install_path: String,
    pub activation: Activation,
    pub health_port: u16,
}

impl ServiceDefinition {
    /// Resolve the deployment host, honouring the environment override
    pub fn host(&self) -> String {
        self.resolve_host(|key| std::env::var(key).ok())
    }

    pub fn resolve_host<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.host_env)
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| self.host.clone())
    }

    /// Base URL of the service's health/version endpoints
    pub fn health_base_url(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.health_port)
    }

    /// Staging path the new binary is uploaded to
    pub fn staged_path(&self) -> String {
        format!("{}.new", self.install_path)
    }

    /// Path the previous binary is preserved at
    pub fn backup_path(&self) -> String {
        format!("{}.prev", self.install_path)
    }
}

/// The set of deployable services plus the order a fleet deploy walks them in
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ServiceDefinition>,
    order: Vec<String>,
}

impl ServiceRegistry {
    /// Build a registry, checking that every ordered name resolves exactly once
    pub fn new(services: Vec<ServiceDefinition>, order: &[&str]) -> Result<Self, DeployError> {
        for (i, service) in services.iter().enumerate() {
            if services[..i].iter().any(|s| s.name == service.name) {
                return Err(DeployError::ConfigError(format!(
                    "Service {} is defined twice",
                    service.name
                )));
            }
            if service.health_port == 0 {
                return Err(DeployError::ConfigError(format!(
                    "Service {} has no health port",
                    service.name
                )));
            }
        }

        for (i, name) in order.iter().enumerate() {
            if order[..i].contains(name) {
                return Err(DeployError::ConfigError(format!(
                    "Service {} appears twice in the deploy order",
                    name
                )));
            }
            if !services.iter().any(|s| s.name == *name) {
                return Err(DeployError::ConfigError(format!(
                    "Deploy order names undefined service {}",
                    name
                )));
            }
        }

        if order.len() != services.len() {
            return Err(DeployError::ConfigError(
                "Every service must appear in the deploy order".to_string(),
            ));
        }

        Ok(Self {
            services,
            order: order.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// The compiled-in fleet
    pub fn builtin() -> Self {
        Self {
            services: builtin_services(),
            order: DEPLOY_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Look up a service by name. Unknown names are a hard error.
    pub fn get(&self, name: &str) -> Result<&ServiceDefinition, DeployError> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DeployError::UnknownService {
                name: name.to_string(),
                known: self.order.join(", "),
            })
    }

    /// All services in deploy order
    pub fn in_order(&self) -> Vec<&ServiceDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.services.iter().find(|s| &s.name == name))
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_services() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition {
            name: "gateway".to_string(),
            target_os: "linux".to_string(),
            target_arch: "amd64".to_string(),
            source_dir: "cmd/gateway".to_string(),
            artifact_name: "gateway".to_string(),
            host: "gateway.fleet.internal".to_string(),
            host_env: "GATEWAY_HOST".to_string(),
            install_path: "/usr/local/bin/gateway".to_string(),
            activation: Activation::Native {
                manager: ProcessManager::Systemd,
                unit: "gateway.service".to_string(),
            },
            health_port: 8080,
        },
        ServiceDefinition {
            name: "worker".to_string(),
            target_os: "linux".to_string(),
            target_arch: "amd64".to_string(),
            source_dir: "cmd/worker".to_string(),
            artifact_name: "worker".to_string(),
            host: "worker.fleet.internal".to_string(),
            host_env: "WORKER_HOST".to_string(),
            install_path: "/opt/fleet/bin/worker".to_string(),
            activation: Activation::Scheduled {
                job_spec_path: "deploy/jobs/worker.nomad.hcl".to_string(),
                job_name: "worker".to_string(),
            },
            health_port: 8081,
        },
        ServiceDefinition {
            name: "ai-coordinator".to_string(),
            target_os: "darwin".to_string(),
            target_arch: "arm64".to_string(),
            source_dir: "cmd/ai-coordinator".to_string(),
            artifact_name: "ai-coordinator".to_string(),
            host: "coordinator.fleet.internal".to_string(),
            host_env: "AI_COORDINATOR_HOST".to_string(),
            install_path: "/usr/local/bin/ai-coordinator".to_string(),
            activation: Activation::Native {
                manager: ProcessManager::Launchd,
                unit: "com.fleet.ai-coordinator".to_string(),
            },
            health_port: 8090,
        },
    ]
}

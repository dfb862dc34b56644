//! Error types for the fleet deployer

use std::time::Duration;

use thiserror::Error;

use crate::deploy::attempt::Stage;

/// Main error type for the fleet deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] sqlx::Error),

    #[error("Unknown service: {name} (known services: {known})")]
    UnknownService { name: String, known: String },

    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Build failed for {service}:\n{output}")]
    BuildError { service: String, output: String },

    #[error("{operation} on {host} failed: {message}")]
    TransportError {
        operation: String,
        host: String,
        message: String,
    },

    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Source control error: {0}")]
    SourceControlError(String),

    #[error("Verification of {service} timed out after {}s", .bound.as_secs())]
    VerificationTimeout { service: String, bound: Duration },

    #[error("Commit mismatch for {service}: expected {expected}, serving {actual}")]
    CommitMismatch {
        service: String,
        expected: String,
        actual: String,
    },

    #[error("Verification of {service} failed: {message}")]
    VerificationFailed { service: String, message: String },

    #[error("{stage} stage failed for {service}: {source}")]
    Stage {
        service: String,
        stage: Stage,
        source: Box<DeployError>,
    },

    #[error("Deployment of {service} failed, previous binary restored: {cause}")]
    RolledBack {
        service: String,
        cause: Box<DeployError>,
    },

    #[error("Deployment of {service} failed AND rollback failed. Manual intervention required. Deployment: {cause}. Rollback: {rollback}")]
    RollbackFailed {
        service: String,
        cause: Box<DeployError>,
        rollback: Box<DeployError>,
    },

    #[error("Notification error: {0}")]
    NotifyError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Whether this error (or the cause it wraps) is a verification timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            DeployError::VerificationTimeout { .. } => true,
            DeployError::Stage { source, .. } => source.is_timeout(),
            DeployError::RolledBack { cause, .. } | DeployError::RollbackFailed { cause, .. } => {
                cause.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

//! State machine for a single service deployment attempt

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Created, nothing has run yet
    Pending,

    /// Cross-compiling the artifact
    Building,

    /// Backing up, uploading and installing on the host
    Transferring,

    /// Restarting or submitting to the scheduler
    Activating,

    /// Waiting for the new version to report healthy
    Verifying,

    /// Restoring the previous binary
    RollingBack,

    /// New version verified and serving
    Deployed,

    /// Previous binary restored after a failed verification
    RolledBack,

    /// Aborted
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Deployed | Stage::RolledBack | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Building => "build",
            Stage::Transferring => "transfer",
            Stage::Activating => "activation",
            Stage::Verifying => "verification",
            Stage::RollingBack => "rollback",
            Stage::Deployed => "deployed",
            Stage::RolledBack => "rolled back",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Attempt event
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    /// Begin the build
    Start,

    /// Artifact built
    Built,

    /// The live binary was copied to the backup path
    BackupTaken,

    /// New binary renamed over the live path
    Installed,

    /// Restart or scheduler submission returned successfully
    Activated,

    /// Health verification passed
    Verified,

    /// Verification failed and the previous binary is being restored
    BeginRollback,

    /// Previous binary restored and restarted
    RollbackComplete,

    /// Abort with an error
    Fail(String),
}

/// One deployment of one service. Never persisted.
#[derive(Debug, Clone)]
pub struct DeploymentAttempt {
    service: String,
    expected_commit: String,
    stage: Stage,
    backup_taken: bool,
    activated: bool,
    verified: bool,
    rolled_back: bool,
    error: Option<String>,
}

impl DeploymentAttempt {
    /// Create a new attempt in pending state
    pub fn new(service: impl Into<String>, expected_commit: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            expected_commit: expected_commit.into(),
            stage: Stage::Pending,
            backup_taken: false,
            activated: false,
            verified: false,
            rolled_back: false,
            error: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn expected_commit(&self) -> &str {
        &self.expected_commit
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn backup_taken(&self) -> bool {
        self.backup_taken
    }

    pub fn activated(&self) -> bool {
        self.activated
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn rolled_back(&self) -> bool {
        self.rolled_back
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition stage
    pub fn process(&mut self, event: AttemptEvent) -> Result<(), DeployError> {
        let next = match (self.stage, &event) {
            (Stage::Pending, AttemptEvent::Start) => Stage::Building,

            (Stage::Building, AttemptEvent::Built) => Stage::Transferring,

            (Stage::Transferring, AttemptEvent::BackupTaken) => {
                self.backup_taken = true;
                Stage::Transferring
            }
            (Stage::Transferring, AttemptEvent::Installed) => Stage::Activating,

            (Stage::Activating, AttemptEvent::Activated) => {
                self.activated = true;
                Stage::Verifying
            }

            (Stage::Verifying, AttemptEvent::Verified) => {
                self.verified = true;
                Stage::Deployed
            }
            (Stage::Verifying, AttemptEvent::BeginRollback) => Stage::RollingBack,

            (Stage::RollingBack, AttemptEvent::RollbackComplete) => {
                self.rolled_back = true;
                Stage::RolledBack
            }

            (stage, AttemptEvent::Fail(err)) if !stage.is_terminal() => {
                self.error = Some(err.clone());
                Stage::Failed
            }

            (stage, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{}: {:?} -> {:?}",
                    self.service, stage, event
                )));
            }
        };

        self.stage = next;
        Ok(())
    }
}

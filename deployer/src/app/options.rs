//! Deployment configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::activation::DEFAULT_SCHEDULER_ADDRESS;
use crate::errors::DeployError;

/// Environment variable holding the scheduler address
pub const SCHEDULER_ADDRESS_ENV: &str = "NOMAD_ADDR";

/// Environment variable holding the ledger connection string
pub const DATABASE_URL_ENV: &str = "DEPLOY_DATABASE_URL";

/// Environment variable holding the notification webhook
pub const NOTIFY_WEBHOOK_ENV: &str = "DEPLOY_NOTIFY_WEBHOOK";

/// Options for a deploy invocation
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Root of the source tree services are built from
    pub source_root: PathBuf,

    /// Build output directory, relative to `source_root`
    pub build_dir: PathBuf,

    /// Scheduler API address
    pub scheduler_address: String,

    /// Health verification bounds
    pub verify: VerifyOptions,

    /// Print the plan without running anything
    pub dry_run: bool,

    /// Remote login user, if not the local default
    pub ssh_user: Option<String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("."),
            build_dir: PathBuf::from("bin"),
            scheduler_address: DEFAULT_SCHEDULER_ADDRESS.to_string(),
            verify: VerifyOptions::default(),
            dry_run: false,
            ssh_user: None,
        }
    }
}

impl DeployOptions {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(address) = non_empty_env(SCHEDULER_ADDRESS_ENV) {
            options.scheduler_address = address;
        }
        options
    }
}

/// Health verification options
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Bound on polling `/health` for natively supervised services
    pub native_timeout: Duration,

    /// Bound on polling the scheduler for job status
    pub scheduled_timeout: Duration,

    /// Delay between polls
    pub poll_interval: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            native_timeout: Duration::from_secs(30),
            scheduled_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl VerifyOptions {
    /// Same bound for both backends
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.native_timeout = timeout;
        self.scheduled_timeout = timeout;
        self
    }
}

/// Ledger store options
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Postgres connection string
    pub database_url: String,

    /// Webhook notifications are posted to
    pub notify_webhook: Option<String>,
}

impl LedgerOptions {
    /// Read from the environment. A missing connection string is an error.
    pub fn from_env() -> Result<Self, DeployError> {
        let database_url = non_empty_env(DATABASE_URL_ENV)
            .ok_or_else(|| DeployError::MissingEnv(DATABASE_URL_ENV.to_string()))?;

        Ok(Self {
            database_url,
            notify_webhook: non_empty_env(NOTIFY_WEBHOOK_ENV),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let verify = VerifyOptions::default();
        assert_eq!(verify.native_timeout, Duration::from_secs(30));
        assert_eq!(verify.scheduled_timeout, Duration::from_secs(60));
        assert_eq!(verify.poll_interval, Duration::from_secs(1));

        let verify = verify.with_timeout(Duration::from_secs(5));
        assert_eq!(verify.native_timeout, Duration::from_secs(5));
        assert_eq!(verify.scheduled_timeout, Duration::from_secs(5));
    }
}

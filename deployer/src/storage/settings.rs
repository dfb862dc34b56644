//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployError;
use crate::logs::LogLevel;

/// Environment variable pointing at an alternative settings file
pub const SETTINGS_PATH_ENV: &str = "DEPLOY_SETTINGS";

/// Operator settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Operator identity recorded in the ledger
    #[serde(default)]
    pub operator: Option<String>,

    /// Webhook deployment notifications are posted to
    #[serde(default)]
    pub notify_webhook: Option<String>,

    /// Remote login user for ssh/scp
    #[serde(default)]
    pub ssh_user: Option<String>,
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults.
    pub async fn load(path: &Path) -> Result<Self, DeployError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents).map_err(|e| {
            DeployError::ConfigError(format!("invalid settings file {}: {}", path.display(), e))
        })
    }

    /// `$DEPLOY_SETTINGS`, else `$HOME/.config/fleet-deploy/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config/fleet-deploy/settings.json"))
    }
}

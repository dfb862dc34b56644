//! Remote shell and copy over ssh/scp

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;
use crate::fleet::services::ProcessManager;
use crate::utils::shell_quote;

/// Operations the deployer runs on a service host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Copy the live binary to `<path>.prev` if it exists. Prints `backed-up`
    /// when a backup was taken.
    Backup { install_path: String },

    /// Mark `<path>.new` executable and rename it over the live path
    Install { install_path: String },

    /// Rename `<path>.prev` back over the live path
    Restore { install_path: String },

    /// Restart the unit through the native supervisor
    Restart { manager: ProcessManager, unit: String },

    /// Ask the native supervisor whether the unit is running
    IsActive { manager: ProcessManager, unit: String },
}

/// Marker printed by [`RemoteCommand::Backup`] when the live binary was preserved
pub const BACKUP_TAKEN_MARKER: &str = "backed-up";

impl RemoteCommand {
    /// Short operation name used in error messages
    pub fn operation(&self) -> &'static str {
        match self {
            RemoteCommand::Backup { .. } => "backup",
            RemoteCommand::Install { .. } => "install",
            RemoteCommand::Restore { .. } => "restore",
            RemoteCommand::Restart { .. } => "restart",
            RemoteCommand::IsActive { .. } => "status",
        }
    }

    /// Render as a POSIX shell command line
    pub fn to_shell(&self) -> String {
        match self {
            RemoteCommand::Backup { install_path } => {
                let live = shell_quote(install_path);
                let prev = shell_quote(&format!("{install_path}.prev"));
                format!(
                    "if [ -f {live} ]; then cp -p {live} {prev} && echo {BACKUP_TAKEN_MARKER}; \
                     else rm -f {prev}; echo no-backup; fi"
                )
            }
            RemoteCommand::Install { install_path } => {
                let live = shell_quote(install_path);
                let staged = shell_quote(&format!("{install_path}.new"));
                format!("chmod +x {staged} && mv -f {staged} {live}")
            }
            RemoteCommand::Restore { install_path } => {
                let live = shell_quote(install_path);
                let prev = shell_quote(&format!("{install_path}.prev"));
                format!("test -f {prev} && mv -f {prev} {live}")
            }
            RemoteCommand::Restart { manager, unit } => match manager {
                ProcessManager::Systemd => {
                    format!("sudo systemctl restart {}", shell_quote(unit))
                }
                ProcessManager::Launchd => {
                    format!("sudo launchctl kickstart -k {}", shell_quote(&format!("system/{unit}")))
                }
            },
            RemoteCommand::IsActive { manager, unit } => match manager {
                ProcessManager::Systemd => format!("systemctl is-active {}", shell_quote(unit)),
                ProcessManager::Launchd => format!(
                    "launchctl print {} >/dev/null && echo running",
                    shell_quote(&format!("system/{unit}"))
                ),
            },
        }
    }
}

/// Remote shell and remote copy
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Run a command on `host`, returning its trimmed stdout
    async fn exec(&self, host: &str, command: &RemoteCommand) -> Result<String, DeployError>;

    /// Copy a local file to `remote_path` on `host`
    async fn upload(&self, local: &Path, host: &str, remote_path: &str)
        -> Result<(), DeployError>;
}

/// `ssh`/`scp` from the PATH, non-interactive
#[derive(Debug, Clone)]
pub struct SshRemote {
    user: Option<String>,
    connect_timeout_secs: u64,
}

impl SshRemote {
    pub fn new(user: Option<String>) -> Self {
        Self {
            user,
            connect_timeout_secs: 10,
        }
    }

    fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    fn common_opts(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ]
    }
}

impl Default for SshRemote {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl RemoteHost for SshRemote {
    async fn exec(&self, host: &str, command: &RemoteCommand) -> Result<String, DeployError> {
        let line = command.to_shell();
        debug!("ssh {} -- {}", host, line);

        let output = Command::new("ssh")
            .args(self.common_opts())
            .arg(self.destination(host))
            .arg(&line)
            .output()
            .await
            .map_err(|e| DeployError::TransportError {
                operation: command.operation().to_string(),
                host: host.to_string(),
                message: format!("failed to run ssh: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(DeployError::TransportError {
                operation: command.operation().to_string(),
                host: host.to_string(),
                message: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() }
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn upload(
        &self,
        local: &Path,
        host: &str,
        remote_path: &str,
    ) -> Result<(), DeployError> {
        let target = format!("{}:{}", self.destination(host), remote_path);
        debug!("scp {} {}", local.display(), target);

        let output = Command::new("scp")
            .args(self.common_opts())
            .arg("-q")
            .arg(local)
            .arg(&target)
            .output()
            .await
            .map_err(|e| DeployError::TransportError {
                operation: "upload".to_string(),
                host: host.to_string(),
                message: format!("failed to run scp: {e}"),
            })?;

        if !output.status.success() {
            return Err(DeployError::TransportError {
                operation: "upload".to_string(),
                host: host.to_string(),
                message: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(())
    }
}

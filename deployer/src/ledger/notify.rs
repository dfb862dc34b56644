//! Deployment notifications

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::errors::DeployError;
use crate::models::history::DeployHistoryEntry;

/// Sends a human-readable announcement of a recorded deployment
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, entry: &DeployHistoryEntry) -> Result<(), DeployError>;
}

/// Posts `{"text": ...}` to a chat webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, entry: &DeployHistoryEntry) -> Result<(), DeployError> {
        debug!("POST {} (deploy notification)", self.url);
        let body = serde_json::json!({ "text": format_message(entry) });

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DeployError::NotifyError(format!("{}: {}", status, text)));
        }
        Ok(())
    }
}

/// Message body announcing a deployment
pub fn format_message(entry: &DeployHistoryEntry) -> String {
    let mut message = format!(
        "Deployed {} {} by {}",
        entry.service_name,
        short(&entry.commit),
        entry.deployed_by
    );
    if let Some(version) = &entry.version {
        message.push_str(&format!(" ({version})"));
    }
    if let Some(previous) = &entry.previous_commit {
        message.push_str(&format!(", previously {}", short(previous)));
    }
    if !entry.changes.trim().is_empty() {
        message.push('\n');
        message.push_str(entry.changes.trim());
    }
    message
}

fn short(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_message() {
        let entry = DeployHistoryEntry {
            id: 1,
            service_name: "gateway".to_string(),
            commit: "9f3c2a1d44e0".to_string(),
            previous_commit: Some("17be0c2aa".to_string()),
            version: Some("v1.4.2".to_string()),
            deployed_at: Utc::now(),
            deployed_by: "ops".to_string(),
            changes: "9f3c2a1 Fix retry budget\n".to_string(),
            shard_ids: vec![],
        };

        assert_eq!(
            format_message(&entry),
            "Deployed gateway 9f3c2a1 by ops (v1.4.2), previously 17be0c2\n9f3c2a1 Fix retry budget"
        );
    }
}

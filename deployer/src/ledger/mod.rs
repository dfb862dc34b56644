//! Deployment ledger: append-only history plus best-effort notification

pub mod memory;
pub mod notify;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::deploy::stamp::{resolve_version, SourceControl};
use crate::errors::DeployError;
use crate::ledger::notify::Notifier;
use crate::ledger::store::LedgerStore;
use crate::models::history::{DeployHistoryEntry, HistoryFilter, NewHistoryEntry};

/// Operator recorded when none is given or configured
pub const DEFAULT_OPERATOR: &str = "deploy-bot";

/// Changelog recorded when no range log is available
pub const DEFAULT_CHANGES: &str = "No changelog available";

/// Input to [`Ledger::record`]
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub service: String,
    pub commit: String,
    pub previous_commit: Option<String>,
    pub deployed_by: Option<String>,
    pub version: Option<String>,
    pub changes: Option<String>,
    pub shard_ids: Vec<String>,
    pub notify: bool,
}

impl RecordRequest {
    pub fn new(service: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            commit: commit.into(),
            previous_commit: None,
            deployed_by: None,
            version: None,
            changes: None,
            shard_ids: Vec::new(),
            notify: true,
        }
    }
}

/// What happened to the notification attached to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Sent,
    Disabled,
    NotConfigured,
    Failed(String),
}

/// Result of a successful record
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub entry: DeployHistoryEntry,
    pub notification: Notification,
}

/// Write/read contract over the deployment history store
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    source: Arc<dyn SourceControl>,
    notifier: Option<Arc<dyn Notifier>>,
    operator: Option<String>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, source: Arc<dyn SourceControl>) -> Self {
        Self {
            store,
            source,
            notifier: None,
            operator: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Operator identity from configuration, used when a record names none
    pub fn with_operator(mut self, operator: Option<String>) -> Self {
        self.operator = operator.filter(|o| !o.trim().is_empty());
        self
    }

    /// Append exactly one row. A notification failure never fails the record.
    pub async fn record(&self, request: RecordRequest) -> Result<RecordOutcome, DeployError> {
        if request.commit.trim().is_empty() {
            return Err(DeployError::ConfigError("a commit is required".to_string()));
        }

        let previous_commit = match request.previous_commit.filter(|c| !c.trim().is_empty()) {
            Some(commit) => Some(commit),
            None => self.latest_commit(&request.service).await?,
        };

        let version = match request.version.filter(|v| !v.trim().is_empty()) {
            Some(version) => version,
            None => resolve_version(self.source.as_ref()).await,
        };

        let changes = match request.changes.filter(|c| !c.trim().is_empty()) {
            Some(changes) => changes,
            None => self.changelog(previous_commit.as_deref(), &request.commit).await,
        };

        let deployed_by = request
            .deployed_by
            .filter(|d| !d.trim().is_empty())
            .or_else(|| self.operator.clone())
            .unwrap_or_else(|| DEFAULT_OPERATOR.to_string());

        let entry = NewHistoryEntry {
            service_name: request.service,
            commit: request.commit,
            previous_commit,
            version: Some(version),
            deployed_at: Utc::now(),
            deployed_by,
            changes,
            shard_ids: request.shard_ids,
        };

        let entry = self.store.insert(&entry).await?;
        info!(
            "Recorded deployment #{} of {} @ {}",
            entry.id, entry.service_name, entry.commit
        );

        let notification = if !request.notify {
            Notification::Disabled
        } else {
            self.send_notification(&entry).await
        };

        Ok(RecordOutcome {
            entry,
            notification,
        })
    }

    /// Most recent rows first, optionally for one service and capped
    pub async fn history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<DeployHistoryEntry>, DeployError> {
        self.store.query(filter).await
    }

    async fn latest_commit(&self, service: &str) -> Result<Option<String>, DeployError> {
        let filter = HistoryFilter {
            service: Some(service.to_string()),
            limit: Some(1),
        };
        Ok(self.store.query(&filter).await?.into_iter().next().map(|e| e.commit))
    }

    async fn changelog(&self, previous: Option<&str>, commit: &str) -> String {
        let Some(previous) = previous else {
            return DEFAULT_CHANGES.to_string();
        };
        match self.source.log_range(previous, commit).await {
            Ok(log) if !log.trim().is_empty() => log.trim().to_string(),
            Ok(_) => DEFAULT_CHANGES.to_string(),
            Err(e) => {
                warn!("Unable to read changelog {}..{}: {}", previous, commit, e);
                DEFAULT_CHANGES.to_string()
            }
        }
    }

    async fn send_notification(&self, entry: &DeployHistoryEntry) -> Notification {
        let Some(notifier) = &self.notifier else {
            warn!("No notification target configured, skipping notification");
            return Notification::NotConfigured;
        };
        match notifier.notify(entry).await {
            Ok(()) => Notification::Sent,
            Err(e) => {
                warn!("Deployment recorded but notification failed: {}", e);
                Notification::Failed(e.to_string())
            }
        }
    }
}

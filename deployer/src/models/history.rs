//! Deployment history models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployHistoryEntry {
    /// Assigned by the store
    pub id: i64,

    pub service_name: String,

    pub commit: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_commit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub deployed_at: DateTime<Utc>,

    pub deployed_by: String,

    /// Free-text changelog
    pub changes: String,

    /// Opaque cross-reference tokens
    #[serde(default)]
    pub shard_ids: Vec<String>,
}

/// A row about to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub service_name: String,
    pub commit: String,
    pub previous_commit: Option<String>,
    pub version: Option<String>,
    pub deployed_at: DateTime<Utc>,
    pub deployed_by: String,
    pub changes: String,
    pub shard_ids: Vec<String>,
}

impl NewHistoryEntry {
    /// Attach the store-assigned id
    pub fn with_id(self, id: i64) -> DeployHistoryEntry {
        DeployHistoryEntry {
            id,
            service_name: self.service_name,
            commit: self.commit,
            previous_commit: self.previous_commit,
            version: self.version,
            deployed_at: self.deployed_at,
            deployed_by: self.deployed_by,
            changes: self.changes,
            shard_ids: self.shard_ids,
        }
    }
}

/// History query filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Only rows for this service
    pub service: Option<String>,

    /// At most this many of the most recent rows
    pub limit: Option<usize>,
}

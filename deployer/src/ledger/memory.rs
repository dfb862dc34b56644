//! In-memory ledger store

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::DeployError;
use crate::ledger::store::LedgerStore;
use crate::models::history::{DeployHistoryEntry, HistoryFilter, NewHistoryEntry};

/// Ledger held in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    rows: Arc<RwLock<Vec<DeployHistoryEntry>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, in insertion order
    pub async fn rows(&self) -> Vec<DeployHistoryEntry> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert(&self, entry: &NewHistoryEntry) -> Result<DeployHistoryEntry, DeployError> {
        let mut rows = self.rows.write().await;
        let id = rows.len() as i64 + 1;
        let row = entry.clone().with_id(id);
        rows.push(row.clone());
        Ok(row)
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<DeployHistoryEntry>, DeployError> {
        let rows = self.rows.read().await;
        let mut matched: Vec<DeployHistoryEntry> = rows
            .iter()
            .filter(|r| filter.service.as_deref().map_or(true, |s| r.service_name == s))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

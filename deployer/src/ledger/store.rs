//! Ledger storage interface

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::history::{DeployHistoryEntry, HistoryFilter, NewHistoryEntry};

/// Append-only storage for deployment history. There is no update or delete.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one row and return it with its assigned id
    async fn insert(&self, entry: &NewHistoryEntry) -> Result<DeployHistoryEntry, DeployError>;

    /// Rows matching the filter, most recent first
    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<DeployHistoryEntry>, DeployError>;
}

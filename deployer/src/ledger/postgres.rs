//! PostgreSQL ledger store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::errors::DeployError;
use crate::ledger::store::LedgerStore;
use crate::models::history::{DeployHistoryEntry, HistoryFilter, NewHistoryEntry};

const DEFAULT_TABLE: &str = "deploy_history";

/// Ledger backed by a single Postgres table
#[derive(Clone, Debug)]
pub struct PgLedger {
    pool: PgPool,
    table: String,
}

impl PgLedger {
    /// Connect to the default ledger table. No schema changes are made, so a
    /// read-only role can query history.
    pub async fn connect(url: &str) -> Result<Self, DeployError> {
        Self::connect_to_table(url, DEFAULT_TABLE).await
    }

    /// Connect to a ledger kept in `table`
    pub async fn connect_to_table(url: &str, table: &str) -> Result<Self, DeployError> {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DeployError::ConfigError(format!(
                "invalid ledger table name: {table}"
            )));
        }

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| DeployError::ConfigError(format!("unable to connect to ledger: {e}")))?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Create the table and its index if missing. Only the write path calls this.
    pub async fn ensure_schema(&self) -> Result<(), DeployError> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                service_name TEXT NOT NULL,
                commit TEXT NOT NULL,
                previous_commit TEXT,
                version TEXT,
                deployed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deployed_by TEXT NOT NULL,
                changes TEXT NOT NULL,
                shard_ids TEXT[] NOT NULL DEFAULT '{{}}'
            )
            "#,
            self.table
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_service_time ON {} (service_name, deployed_at DESC)",
            self.table, self.table
        );
        sqlx::query(&create_index).execute(&self.pool).await?;

        Ok(())
    }
}

/// `LIMIT` bind for a history query. `None` binds NULL, which is `LIMIT ALL`.
fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

fn row_to_entry(row: &PgRow) -> Result<DeployHistoryEntry, sqlx::Error> {
    Ok(DeployHistoryEntry {
        id: row.try_get("id")?,
        service_name: row.try_get("service_name")?,
        commit: row.try_get("commit")?,
        previous_commit: row.try_get("previous_commit")?,
        version: row.try_get("version")?,
        deployed_at: row.try_get::<DateTime<Utc>, _>("deployed_at")?,
        deployed_by: row.try_get("deployed_by")?,
        changes: row.try_get("changes")?,
        shard_ids: row.try_get("shard_ids")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn insert(&self, entry: &NewHistoryEntry) -> Result<DeployHistoryEntry, DeployError> {
        let query = format!(
            r#"
            INSERT INTO {} (service_name, commit, previous_commit, version,
                            deployed_at, deployed_by, changes, shard_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
            self.table
        );

        let row = sqlx::query(&query)
            .bind(&entry.service_name)
            .bind(&entry.commit)
            .bind(&entry.previous_commit)
            .bind(&entry.version)
            .bind(entry.deployed_at)
            .bind(&entry.deployed_by)
            .bind(&entry.changes)
            .bind(&entry.shard_ids)
            .fetch_one(&self.pool)
            .await?;

        let id: i64 = row.try_get("id")?;
        debug!("Ledger row {} for {} @ {}", id, entry.service_name, entry.commit);
        Ok(entry.clone().with_id(id))
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<DeployHistoryEntry>, DeployError> {
        // LIMIT NULL is LIMIT ALL in Postgres
        let query = format!(
            r#"
            SELECT id, service_name, commit, previous_commit, version,
                   deployed_at, deployed_by, changes, shard_ids
            FROM {}
            WHERE ($1::TEXT IS NULL OR service_name = $1)
            ORDER BY deployed_at DESC, id DESC
            LIMIT $2
            "#,
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(&filter.service)
            .bind(limit_param(filter.limit))
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .iter()
            .map(row_to_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

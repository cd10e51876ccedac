//! SQLite storage engine
//!
//! Applies pending changes to the `entities` table inside a sqlx
//! transaction. Dropping an uncommitted [`SqliteTransaction`] rolls it back.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::debug;

use crate::domain::{ChangeOp, PendingChange};
use crate::error::{Error, Result};
use crate::storage::database::{Database, DatabaseConfig};
use crate::uow::{CommittedReader, StorageEngine, TransactionHandle};

/// sqlx-backed [`StorageEngine`]
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    db: Database,
}

impl SqliteEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect and migrate a database for the engine
    pub async fn connect(config: DatabaseConfig) -> anyhow::Result<Self> {
        Ok(Self::new(Database::new(config).await?))
    }

    /// Engine over a fresh in-memory database (useful for testing)
    ///
    /// The database has a single connection, so units of work on this
    /// engine run one transaction at a time. A committed read issued while
    /// a transaction is open waits for the pool's acquire timeout and
    /// fails. Use [`SqliteEngine::connect`] with a file path for concurrent
    /// units of work.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Database::in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    type Transaction = SqliteTransaction;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn begin(&self) -> Result<SqliteTransaction> {
        let tx = self.db.pool().begin().await.map_err(Error::DatabaseError)?;
        Ok(SqliteTransaction { tx })
    }
}

#[async_trait]
impl CommittedReader for SqliteEngine {
    async fn load(&self, kind: &str, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM entities WHERE kind = ? AND key = ?")
                .bind(kind)
                .bind(key)
                .fetch_optional(self.db.pool())
                .await
                .map_err(Error::DatabaseError)?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn count(&self, kind: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE kind = ?")
            .bind(kind)
            .fetch_one(self.db.pool())
            .await
            .map_err(Error::DatabaseError)?;

        Ok(count as u64)
    }
}

/// Transaction handle of the [`SqliteEngine`]
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction").finish_non_exhaustive()
    }
}

impl SqliteTransaction {
    /// The connection the transaction runs on, for engine-specific queries
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    async fn apply(&mut self, change: &PendingChange) -> Result<u64> {
        let payload = change.payload_text()?;
        let now = Utc::now();

        let result = match change.op {
            ChangeOp::Insert => {
                sqlx::query(
                    r#"
                    INSERT INTO entities (kind, key, payload, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&change.kind)
                .bind(&change.key)
                .bind(&payload)
                .bind(now)
                .bind(now)
                .execute(&mut *self.tx)
                .await
            }
            ChangeOp::Update => {
                sqlx::query(
                    r#"
                    UPDATE entities SET payload = ?, updated_at = ?
                    WHERE kind = ? AND key = ?
                    "#,
                )
                .bind(&payload)
                .bind(now)
                .bind(&change.kind)
                .bind(&change.key)
                .execute(&mut *self.tx)
                .await
            }
            ChangeOp::Upsert => {
                sqlx::query(
                    r#"
                    INSERT INTO entities (kind, key, payload, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(kind, key) DO UPDATE SET
                        payload = excluded.payload,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&change.kind)
                .bind(&change.key)
                .bind(&payload)
                .bind(now)
                .bind(now)
                .execute(&mut *self.tx)
                .await
            }
            ChangeOp::Delete => {
                sqlx::query("DELETE FROM entities WHERE kind = ? AND key = ?")
                    .bind(&change.kind)
                    .bind(&change.key)
                    .execute(&mut *self.tx)
                    .await
            }
        }
        .map_err(Error::DatabaseError)?;

        debug!(change = %change, rows = result.rows_affected(), "Applied change");
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(Error::DatabaseError)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(Error::DatabaseError)
    }
}

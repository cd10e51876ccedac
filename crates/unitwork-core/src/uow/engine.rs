//! Storage engine seam
//!
//! A unit of work depends on the storage engine only through these traits.
//! Each engine supplies its own transaction handle type.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::PendingChange;
use crate::error::Result;

/// An open engine transaction
///
/// Dropping a handle without calling `commit` or `rollback` must discard
/// its writes.
#[async_trait]
pub trait TransactionHandle: Send + Sized + 'static {
    /// Apply one change inside the transaction, returning affected rows
    async fn apply(&mut self, change: &PendingChange) -> Result<u64>;

    /// Make every applied change durable
    async fn commit(self) -> Result<()>;

    /// Discard every applied change
    async fn rollback(self) -> Result<()>;
}

/// A storage engine able to open transactions
#[async_trait]
pub trait StorageEngine: Send + Sync + 'static {
    type Transaction: TransactionHandle;

    /// Short engine name used in logs
    fn name(&self) -> &'static str;

    /// Open a new transaction
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// Read access to committed state, used by repositories after a save
#[async_trait]
pub trait CommittedReader: Send + Sync {
    async fn load(&self, kind: &str, key: &str) -> Result<Option<Value>>;

    async fn count(&self, kind: &str) -> Result<u64>;
}

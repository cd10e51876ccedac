//! In-process storage engine
//!
//! Keeps committed rows in a map. Transactions stage their writes and
//! publish them under a single write lock on commit, so readers never see
//! a partial save. Faults can be injected to exercise failure paths.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ChangeOp, PendingChange};
use crate::error::{Error, Result};
use crate::uow::{CommittedReader, StorageEngine, TransactionHandle};

type RowKey = (String, String);

#[derive(Debug, Default)]
struct Faults {
    /// Apply call (1-based, counted from when the fault was armed) that fails
    fail_write_at: Option<usize>,
    writes_seen: usize,
    fail_next_commit: bool,
    begin_delay: Option<Duration>,
    apply_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: RwLock<HashMap<RowKey, Value>>,
    faults: Mutex<Faults>,
    open: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemoryState {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_write_fault(&self, change: &PendingChange) -> Result<()> {
        let mut faults = self.faults();
        faults.writes_seen += 1;
        if faults.fail_write_at == Some(faults.writes_seen) {
            faults.fail_write_at = None;
            return Err(Error::Storage(format!("injected write failure on {}", change)));
        }
        Ok(())
    }

    fn release(&self, committed: bool) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        if committed {
            self.commits.fetch_add(1, Ordering::SeqCst);
        } else {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// In-memory [`StorageEngine`]
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a committed row directly, bypassing any unit of work
    pub async fn seed(&self, kind: &str, key: &str, value: Value) {
        self.state
            .rows
            .write()
            .await
            .insert((kind.to_string(), key.to_string()), value);
    }

    // ========== Fault injection ==========

    /// Fail the `n`th apply call from now (1-based)
    pub fn fail_write_at(&self, n: usize) {
        let mut faults = self.state.faults();
        faults.writes_seen = 0;
        faults.fail_write_at = Some(n);
    }

    /// Reject the next commit; its writes are discarded
    pub fn fail_next_commit(&self) {
        self.state.faults().fail_next_commit = true;
    }

    /// Delay every `begin` by `delay`
    pub fn delay_begin(&self, delay: Duration) {
        self.state.faults().begin_delay = Some(delay);
    }

    /// Delay every `apply` by `delay`
    pub fn delay_apply(&self, delay: Duration) {
        self.state.faults().apply_delay = Some(delay);
    }

    pub fn clear_faults(&self) {
        *self.state.faults() = Faults::default();
    }

    // ========== Counters ==========

    /// Transactions begun and not yet committed, rolled back or dropped
    pub fn open_transactions(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    /// Explicit rollbacks, rejected commits and dropped transactions
    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    type Transaction = MemoryTransaction;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<MemoryTransaction> {
        let delay = self.state.faults().begin_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.open.fetch_add(1, Ordering::SeqCst);
        let tx = MemoryTransaction {
            id: Uuid::new_v4(),
            state: Arc::clone(&self.state),
            staged: Vec::new(),
            finished: false,
        };
        debug!(transaction_id = %tx.id, "Memory transaction begun");
        Ok(tx)
    }
}

#[async_trait]
impl CommittedReader for MemoryEngine {
    async fn load(&self, kind: &str, key: &str) -> Result<Option<Value>> {
        let rows = self.state.rows.read().await;
        Ok(rows.get(&(kind.to_string(), key.to_string())).cloned())
    }

    async fn count(&self, kind: &str) -> Result<u64> {
        let rows = self.state.rows.read().await;
        Ok(rows.keys().filter(|(k, _)| k == kind).count() as u64)
    }
}

/// Transaction handle of the [`MemoryEngine`]
#[derive(Debug)]
pub struct MemoryTransaction {
    id: Uuid,
    state: Arc<MemoryState>,
    /// Latest write wins; `None` marks a delete
    staged: Vec<(RowKey, Option<Value>)>,
    finished: bool,
}

impl MemoryTransaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Writes staged so far
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    async fn exists(&self, key: &RowKey) -> bool {
        if let Some((_, value)) = self.staged.iter().rev().find(|(k, _)| k == key) {
            return value.is_some();
        }
        self.state.rows.read().await.contains_key(key)
    }
}

#[async_trait]
impl TransactionHandle for MemoryTransaction {
    async fn apply(&mut self, change: &PendingChange) -> Result<u64> {
        let delay = self.state.faults().apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.check_write_fault(change)?;

        let key = (change.kind.clone(), change.key.clone());
        let exists = self.exists(&key).await;

        let rows = match change.op {
            ChangeOp::Insert if exists => {
                return Err(Error::Storage(format!(
                    "duplicate key {}:{}",
                    change.kind, change.key
                )));
            }
            ChangeOp::Update | ChangeOp::Delete if !exists => 0,
            ChangeOp::Insert | ChangeOp::Update | ChangeOp::Upsert => {
                let payload = change.payload.clone().ok_or_else(|| {
                    Error::invalid_argument("payload", format!("{} has no payload", change))
                })?;
                self.staged.push((key, Some(payload)));
                1
            }
            ChangeOp::Delete => {
                self.staged.push((key, None));
                1
            }
        };
        Ok(rows)
    }

    async fn commit(mut self) -> Result<()> {
        self.finished = true;

        let rejected = std::mem::take(&mut self.state.faults().fail_next_commit);
        if rejected {
            self.state.release(false);
            return Err(Error::Storage("injected commit failure".to_string()));
        }

        {
            let mut rows = self.state.rows.write().await;
            for (key, value) in self.staged.drain(..) {
                match value {
                    Some(value) => {
                        rows.insert(key, value);
                    }
                    None => {
                        rows.remove(&key);
                    }
                }
            }
        }

        self.state.release(true);
        debug!(transaction_id = %self.id, "Memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.staged.clear();
        self.state.release(false);
        debug!(transaction_id = %self.id, "Memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.state.release(false);
            debug!(transaction_id = %self.id, "Memory transaction dropped");
        }
    }
}

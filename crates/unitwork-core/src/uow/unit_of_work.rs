//! Unit of work over a storage engine
//!
//! Owns one [`Session`]: the pending changes registered by repositories and
//! at most one open engine transaction. `save_changes` applies every
//! pending change inside a single transaction and commits it, so either all
//! of them become durable or none do.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --begin_transaction--> TransactionOpen --save_changes--> Idle
//!   \                              |
//!    \------- reset / save --------+--> Idle (fresh session on reset)
//!
//! any state --dispose--> Disposed (terminal)
//! ```
//!
//! Every async operation has a `*_cancellable` form taking a
//! [`CancellationToken`] and a `*_blocking` form for synchronous callers.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blocking::BlockingBridge;
use super::engine::{StorageEngine, TransactionHandle};
use super::session::{OpenTransaction, Session, TransactionInfo, UnitOfWorkState};
use crate::domain::{ChangeSet, PendingChange};
use crate::error::{Error, Result};

/// Coordinates atomic persistence of pending changes
///
/// Not meant to be shared between concurrent operations; create one per
/// logical unit of work (see [`super::UnitOfWorkFactory`]).
pub struct UnitOfWork<S: StorageEngine> {
    engine: Arc<S>,
    session: Session<S::Transaction>,
    disposed: bool,
    bridge: BlockingBridge,
}

impl<S: StorageEngine> UnitOfWork<S> {
    /// Create a unit of work with a fresh session
    pub fn new(engine: Arc<S>) -> Self {
        let session = Session::new();
        debug!(
            session_id = %session.id,
            engine = engine.name(),
            "Unit of work created"
        );
        Self {
            engine,
            session,
            disposed: false,
            bridge: BlockingBridge::capture(),
        }
    }

    /// The engine this unit of work writes to
    pub fn engine(&self) -> &S {
        &self.engine
    }

    pub fn state(&self) -> UnitOfWorkState {
        if self.disposed {
            UnitOfWorkState::Disposed
        } else if self.session.transaction.is_some() {
            UnitOfWorkState::TransactionOpen
        } else {
            UnitOfWorkState::Idle
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn session(&self) -> &Session<S::Transaction> {
        &self.session
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn pending(&self) -> &ChangeSet {
        &self.session.changes
    }

    pub fn pending_count(&self) -> usize {
        self.session.changes.len()
    }

    pub fn transaction_info(&self) -> Option<&TransactionInfo> {
        self.session.transaction()
    }

    /// Typed access to the engine's open transaction, if any
    pub fn active_transaction_mut(&mut self) -> Result<Option<&mut S::Transaction>> {
        self.ensure_not_disposed("access the active transaction")?;
        Ok(self
            .session
            .transaction
            .as_mut()
            .map(|open| &mut open.handle))
    }

    /// Stage a change to be written by the next save
    pub fn register(&mut self, change: PendingChange) -> Result<()> {
        self.ensure_not_disposed("register a change")?;
        debug!(
            session_id = %self.session.id,
            change = %change,
            pending = self.session.changes.len() + 1,
            "Registered pending change"
        );
        self.session.changes.push(change);
        Ok(())
    }

    // ========== Begin ==========

    /// Open a transaction that the next save will commit
    ///
    /// Fails with [`Error::InvalidOperation`] if one is already open.
    pub async fn begin_transaction(&mut self) -> Result<TransactionInfo> {
        self.begin_transaction_cancellable(&CancellationToken::new())
            .await
    }

    /// Cancellable form of [`UnitOfWork::begin_transaction`]
    ///
    /// On cancellation nothing is left open and the state is unchanged.
    pub async fn begin_transaction_cancellable(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<TransactionInfo> {
        self.ensure_not_disposed("begin a transaction")?;

        if let Some(open) = &self.session.transaction {
            return Err(Error::InvalidOperation(format!(
                "transaction {} is already open; nested transactions are not supported",
                open.info.id
            )));
        }

        let handle = self.open_handle(cancel, "begin a transaction").await?;
        let info = TransactionInfo::new(true);

        debug!(
            session_id = %self.session.id,
            transaction_id = %info.id,
            "Transaction opened"
        );

        self.session.transaction = Some(OpenTransaction {
            info: info.clone(),
            handle,
        });
        Ok(info)
    }

    /// Blocking form of [`UnitOfWork::begin_transaction`]
    pub fn begin_transaction_blocking(&mut self) -> Result<TransactionInfo> {
        let bridge = self.bridge.clone();
        bridge.run("begin a transaction", self.begin_transaction())?
    }

    // ========== Save ==========

    /// Commit every pending change atomically, returning affected rows
    ///
    /// Uses the open transaction if one was begun, otherwise the save opens
    /// its own. On failure the transaction is rolled back and the pending
    /// changes are kept for inspection or retry.
    pub async fn save_changes(&mut self) -> Result<usize> {
        self.save_changes_cancellable(&CancellationToken::new())
            .await
    }

    /// Cancellable form of [`UnitOfWork::save_changes`]
    ///
    /// Cancellation is observed before any work starts. A save that opened
    /// its own transaction also observes it while writing, rolling back
    /// and keeping the pending changes. A save on an explicitly begun
    /// transaction, and any commit, runs to completion once started.
    pub async fn save_changes_cancellable(&mut self, cancel: &CancellationToken) -> Result<usize> {
        self.ensure_not_disposed("save changes")?;

        if cancel.is_cancelled() {
            return Err(Error::OperationCanceled("save changes".to_string()));
        }

        let pending = self.session.changes.len();
        if pending == 0 {
            debug!(session_id = %self.session.id, "No pending changes to save");
            return Ok(0);
        }

        let started = Instant::now();
        let OpenTransaction { info, mut handle } = match self.session.transaction.take() {
            Some(open) => open,
            None => OpenTransaction {
                handle: self
                    .open_handle(cancel, "save changes")
                    .await
                    .map_err(|e| save_failure(pending, e))?,
                info: TransactionInfo::new(false),
            },
        };

        // A caller's transaction may already hold direct writes; once the save
        // starts on it, it runs to completion
        let written = if info.explicit {
            apply_all(&mut handle, self.session.changes.as_slice()).await
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::OperationCanceled("save changes".to_string())),
                result = apply_all(&mut handle, self.session.changes.as_slice()) => result,
            }
        };

        let affected = match written {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    session_id = %self.session.id,
                    transaction_id = %info.id,
                    pending,
                    error = %e,
                    "Save failed; rolling back and keeping pending changes"
                );
                self.roll_back(handle, &info, "save failed").await;
                return Err(save_failure(pending, e));
            }
        };

        if let Err(e) = handle.commit().await {
            warn!(
                session_id = %self.session.id,
                transaction_id = %info.id,
                pending,
                error = %e,
                "Commit rejected; keeping pending changes"
            );
            return Err(Error::persistence(pending, e));
        }

        self.session.changes.clear();

        info!(
            session_id = %self.session.id,
            transaction_id = %info.id,
            explicit = info.explicit,
            changes = pending,
            affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Saved changes"
        );

        Ok(affected as usize)
    }

    /// Blocking form of [`UnitOfWork::save_changes`]
    pub fn save_changes_blocking(&mut self) -> Result<usize> {
        let bridge = self.bridge.clone();
        bridge.run("save changes", self.save_changes())?
    }

    // ========== Reset ==========

    /// Discard the session and start a fresh one
    ///
    /// An open transaction is rolled back; pending changes are dropped.
    /// The unit of work itself stays usable.
    pub async fn reset(&mut self) -> Result<()> {
        self.ensure_not_disposed("reset")?;

        let previous = std::mem::replace(&mut self.session, Session::new());
        let discarded = previous.changes.len();

        if let Some(open) = previous.transaction {
            self.roll_back(open.handle, &open.info, "reset").await;
        }

        info!(
            previous_session_id = %previous.id,
            session_id = %self.session.id,
            discarded,
            "Unit of work reset"
        );
        Ok(())
    }

    /// Blocking form of [`UnitOfWork::reset`]
    pub fn reset_blocking(&mut self) -> Result<()> {
        let bridge = self.bridge.clone();
        bridge.run("reset", self.reset())?
    }

    // ========== Dispose ==========

    /// Release the session; further use fails with [`Error::ObjectDisposed`]
    ///
    /// Idempotent: disposing again is a no-op.
    pub async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let discarded = self.session.changes.len();
        if discarded > 0 {
            warn!(
                session_id = %self.session.id,
                discarded,
                "Disposing unit of work with unsaved changes"
            );
            self.session.changes.clear();
        }

        if let Some(open) = self.session.transaction.take() {
            self.roll_back(open.handle, &open.info, "dispose").await;
        }

        debug!(session_id = %self.session.id, "Unit of work disposed");
        Ok(())
    }

    /// Blocking form of [`UnitOfWork::dispose`]
    ///
    /// Where the bridge cannot block (a current-thread runtime), the open
    /// transaction is dropped instead of rolled back explicitly; engines
    /// roll back on drop.
    pub fn dispose_blocking(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let bridge = self.bridge.clone();
        match bridge.run("dispose", self.dispose()) {
            Ok(result) => result,
            Err(Error::InvalidOperation(_)) => {
                self.dispose_in_place();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ========== Internals ==========

    fn dispose_in_place(&mut self) {
        self.disposed = true;

        let discarded = self.session.changes.len();
        if discarded > 0 {
            warn!(
                session_id = %self.session.id,
                discarded,
                "Disposing unit of work with unsaved changes"
            );
            self.session.changes.clear();
        }

        if let Some(open) = self.session.transaction.take() {
            debug!(
                session_id = %self.session.id,
                transaction_id = %open.info.id,
                "Dropping open transaction on synchronous dispose"
            );
            drop(open);
        }

        debug!(session_id = %self.session.id, "Unit of work disposed");
    }

    fn ensure_not_disposed(&self, operation: &str) -> Result<()> {
        if self.disposed {
            return Err(Error::ObjectDisposed(format!(
                "unit of work {} (attempted to {})",
                self.session.id, operation
            )));
        }
        Ok(())
    }

    async fn open_handle(
        &self,
        cancel: &CancellationToken,
        operation: &str,
    ) -> Result<S::Transaction> {
        if cancel.is_cancelled() {
            return Err(Error::OperationCanceled(operation.to_string()));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::OperationCanceled(operation.to_string())),
            handle = self.engine.begin() => handle,
        }
    }

    async fn roll_back(&self, handle: S::Transaction, info: &TransactionInfo, reason: &str) {
        match handle.rollback().await {
            Ok(()) => debug!(
                session_id = %self.session.id,
                transaction_id = %info.id,
                reason,
                "Transaction rolled back"
            ),
            Err(e) => warn!(
                session_id = %self.session.id,
                transaction_id = %info.id,
                reason,
                error = %e,
                "Rollback failed; the engine discards the transaction"
            ),
        }
    }
}

async fn apply_all<T: TransactionHandle>(handle: &mut T, changes: &[PendingChange]) -> Result<u64> {
    let mut affected = 0;
    for change in changes {
        let rows = handle.apply(change).await?;
        if rows == 0 && change.op.requires_existing() {
            return Err(Error::StaleChange {
                kind: change.kind.clone(),
                key: change.key.clone(),
            });
        }
        affected += rows;
    }
    Ok(affected)
}

fn save_failure(pending: usize, error: Error) -> Error {
    match error {
        Error::OperationCanceled(_) => error,
        other => Error::persistence(pending, other),
    }
}

impl<S: StorageEngine> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(open) = self.session.transaction.take() {
            warn!(
                session_id = %self.session.id,
                transaction_id = %open.info.id,
                "Unit of work dropped with an open transaction; discarding it"
            );
            drop(open);
        }
        if !self.session.changes.is_empty() {
            debug!(
                session_id = %self.session.id,
                discarded = self.session.changes.len(),
                "Unit of work dropped with unsaved changes"
            );
        }
    }
}

impl<S: StorageEngine> fmt::Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .field("session", &self.session)
            .finish()
    }
}

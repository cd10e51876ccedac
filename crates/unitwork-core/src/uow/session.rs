//! Unit of work session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::ChangeSet;

/// Lifecycle state of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfWorkState {
    /// No open transaction
    Idle,
    /// A transaction was begun and not yet committed or rolled back
    TransactionOpen,
    /// Terminal
    Disposed,
}

impl UnitOfWorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TransactionOpen => "transaction_open",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes an open transaction without exposing the engine handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Begun by the caller rather than implicitly by a save
    pub explicit: bool,
}

impl TransactionInfo {
    pub(crate) fn new(explicit: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            explicit,
        }
    }
}

pub(crate) struct OpenTransaction<T> {
    pub(crate) info: TransactionInfo,
    pub(crate) handle: T,
}

/// Mutable state owned by one unit of work
///
/// Replaced wholesale on reset.
pub struct Session<T> {
    pub(crate) id: Uuid,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) changes: ChangeSet,
    pub(crate) transaction: Option<OpenTransaction<T>>,
}

impl<T> Session<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            changes: ChangeSet::new(),
            transaction: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn transaction(&self) -> Option<&TransactionInfo> {
        self.transaction.as_ref().map(|open| &open.info)
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("pending", &self.changes.len())
            .field("transaction", &self.transaction())
            .finish()
    }
}

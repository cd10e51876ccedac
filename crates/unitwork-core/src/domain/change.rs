//! Pending changes tracked by a unit of work
//!
//! Repositories translate entity operations into [`PendingChange`]s and
//! register them with a unit of work. Changes are applied in registration
//! order when the unit of work saves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::entity::Entity;
use crate::error::{Error, Result};

/// Kind of write a pending change performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Upsert,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    /// Whether the target row must already exist for the write to count
    pub fn requires_existing(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Whether the change carries an entity payload
    pub fn carries_payload(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single write waiting to be committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub kind: String,
    pub key: String,
    pub op: ChangeOp,
    pub payload: Option<Value>,
}

impl PendingChange {
    /// Build a change, checking that it is well formed
    pub fn new(
        kind: impl Into<String>,
        key: impl Into<String>,
        op: ChangeOp,
        payload: Option<Value>,
    ) -> Result<Self> {
        let kind = kind.into();
        let key = key.into();

        if kind.trim().is_empty() {
            return Err(Error::invalid_argument("kind", "entity kind cannot be empty"));
        }
        if key.trim().is_empty() {
            return Err(Error::invalid_argument("key", "entity key cannot be empty"));
        }
        if op.carries_payload() && payload.is_none() {
            return Err(Error::invalid_argument(
                "payload",
                format!("{} of {} '{}' requires a payload", op, kind, key),
            ));
        }

        Ok(Self {
            kind,
            key,
            op,
            payload: if op.carries_payload() { payload } else { None },
        })
    }

    /// Build a change of any kind for an entity
    pub fn for_entity<E: Entity>(entity: &E, op: ChangeOp) -> Result<Self> {
        if !op.carries_payload() {
            return Self::new(E::KIND, entity.key(), op, None);
        }
        let payload = serde_json::to_value(entity)?;
        Self::new(E::KIND, entity.key(), op, Some(payload))
    }

    pub fn insert<E: Entity>(entity: &E) -> Result<Self> {
        Self::for_entity(entity, ChangeOp::Insert)
    }

    pub fn update<E: Entity>(entity: &E) -> Result<Self> {
        Self::for_entity(entity, ChangeOp::Update)
    }

    pub fn upsert<E: Entity>(entity: &E) -> Result<Self> {
        Self::for_entity(entity, ChangeOp::Upsert)
    }

    pub fn delete<E: Entity>(entity: &E) -> Result<Self> {
        Self::for_entity(entity, ChangeOp::Delete)
    }

    /// Payload rendered as JSON text, as stored by text-column engines
    pub fn payload_text(&self) -> Result<Option<String>> {
        self.payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::from)
    }
}

impl fmt::Display for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.op, self.kind, self.key)
    }
}

/// Count of pending changes per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub inserts: usize,
    pub updates: usize,
    pub upserts: usize,
    pub deletes: usize,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.upserts + self.deletes
    }
}

/// Ordered collection of pending changes
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<PendingChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PendingChange> {
        self.changes.iter()
    }

    pub fn as_slice(&self) -> &[PendingChange] {
        &self.changes
    }

    /// Whether a change targeting `kind`/`key` is pending
    pub fn contains(&self, kind: &str, key: &str) -> bool {
        self.changes.iter().any(|c| c.kind == kind && c.key == key)
    }

    pub fn summary(&self) -> ChangeSummary {
        self.changes
            .iter()
            .fold(ChangeSummary::default(), |mut summary, change| {
                match change.op {
                    ChangeOp::Insert => summary.inserts += 1,
                    ChangeOp::Update => summary.updates += 1,
                    ChangeOp::Upsert => summary.upserts += 1,
                    ChangeOp::Delete => summary.deletes += 1,
                }
                summary
            })
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear();
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a PendingChange;
    type IntoIter = std::slice::Iter<'a, PendingChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

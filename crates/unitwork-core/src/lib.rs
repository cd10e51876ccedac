//! Unitwork Core Library
//!
//! This crate provides transactional persistence coordination:
//! - Unit of Work (session, pending changes, atomic save, reset, disposal)
//! - Storage engines (SQLite via sqlx, in-memory)
//! - Validation services and the validate-then-stage gate
//! - Value-level results for expected failures
//! - Named business rules (specifications)

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod result;
pub mod storage;
pub mod uow;

pub use error::{Error, ErrorKind, Result};
pub use result::{ErrorInfo, ValueResult};
pub use tokio_util::sync::CancellationToken;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::application::{
        GateOutcome, RuleValidationService, ValidatableService, ValidationGate,
    };
    pub use crate::config::Config;
    pub use crate::domain::{ChangeOp, Entity, PendingChange, Specification, rule};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::result::{ErrorInfo, ValueResult};
    pub use crate::uow::{StorageEngine, UnitOfWork, UnitOfWorkFactory, UnitOfWorkState};
    pub use tokio_util::sync::CancellationToken;
}

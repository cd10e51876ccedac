//! Error types for unitwork

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using unitwork's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Unitwork error types
///
/// Programmer errors (bad arguments, wrong state, use after dispose) are
/// returned immediately. Expected outcomes such as an invalid entity travel
/// inside a [`crate::ValueResult`] instead.
#[derive(Error, Debug)]
pub enum Error {
    // Argument errors (E001-E099)
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    // State errors (E100-E199)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cannot access a disposed object: {0}")]
    ObjectDisposed(String),

    #[error("Operation cancelled: {0}")]
    OperationCanceled(String),

    // Persistence errors (E200-E299)
    #[error("Failed to persist {pending} pending change(s): {source}")]
    Persistence {
        pending: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Stale change: {kind} '{key}' no longer matches stored state")]
    StaleChange { kind: String, key: String },

    #[error("Storage engine error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Validation errors (E300-E399)
    #[error("Validation could not complete: {0}")]
    ValidationIncomplete(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], carried by value-level results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    InvalidOperation,
    InvalidState,
    ObjectDisposed,
    OperationCanceled,
    Persistence,
    ValidationIncomplete,
    Configuration,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidOperation => "invalid_operation",
            Self::InvalidState => "invalid_state",
            Self::ObjectDisposed => "object_disposed",
            Self::OperationCanceled => "operation_canceled",
            Self::Persistence => "persistence",
            Self::ValidationIncomplete => "validation_incomplete",
            Self::Configuration => "configuration",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Shorthand for an [`Error::InvalidArgument`]
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Wrap an engine error as a failed save of `pending` changes
    pub fn persistence(pending: usize, source: Error) -> Self {
        Self::Persistence {
            pending,
            source: Box::new(source),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "E001",
            Self::InvalidOperation(_) => "E100",
            Self::InvalidState(_) => "E101",
            Self::ObjectDisposed(_) => "E102",
            Self::OperationCanceled(_) => "E103",
            Self::Persistence { .. } => "E200",
            Self::StaleChange { .. } => "E201",
            Self::Storage(_) => "E202",
            Self::DatabaseError(_) => "E203",
            Self::ValidationIncomplete(_) => "E300",
            Self::ConfigError(_) => "E600",
            Self::Serialization(_) | Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::ObjectDisposed(_) => ErrorKind::ObjectDisposed,
            Self::OperationCanceled(_) => ErrorKind::OperationCanceled,
            Self::Persistence { .. }
            | Self::StaleChange { .. }
            | Self::Storage(_)
            | Self::DatabaseError(_) => ErrorKind::Persistence,
            Self::ValidationIncomplete(_) => ErrorKind::ValidationIncomplete,
            Self::ConfigError(_) => ErrorKind::Configuration,
            Self::Serialization(_) | Self::Other(_) | Self::Io(_) => ErrorKind::Other,
        }
    }

    /// Whether the failure came from the storage engine rather than the caller
    pub fn is_persistence(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

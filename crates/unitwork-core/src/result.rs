//! Value-level success/failure wrapper
//!
//! `ValueResult` carries the outcome of an operation whose failure is an
//! expected business result rather than a programmer error. It is built
//! once and never mutated, so it can be shared freely between readers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ErrorKind, Result};

/// Description of a failed outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for ErrorInfo {
    fn from(error: &Error) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<Error> for ErrorInfo {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome<T> {
    Success { value: T },
    Failure { error: ErrorInfo },
}

/// Immutable success-or-failure outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueResult<T> {
    outcome: Outcome<T>,
}

impl<T> ValueResult<T> {
    /// Build a successful outcome
    pub fn success(value: T) -> Self {
        Self {
            outcome: Outcome::Success { value },
        }
    }

    /// Build a failed outcome
    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            outcome: Outcome::Failure { error },
        }
    }

    /// Build a failed outcome from a crate error
    pub fn from_error(error: &Error) -> Self {
        Self::failure(ErrorInfo::from(error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// The carried value
    ///
    /// Fails with [`Error::InvalidState`] on a failed outcome.
    pub fn value(&self) -> Result<&T> {
        match &self.outcome {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { error } => Err(Error::InvalidState(format!(
                "no value on a failed result ({})",
                error
            ))),
        }
    }

    /// The carried error
    ///
    /// Fails with [`Error::InvalidState`] on a successful outcome.
    pub fn error(&self) -> Result<&ErrorInfo> {
        match &self.outcome {
            Outcome::Success { .. } => Err(Error::InvalidState(
                "no error on a successful result".to_string(),
            )),
            Outcome::Failure { error } => Ok(error),
        }
    }

    /// Consume into the carried value, failing like [`ValueResult::value`]
    pub fn into_value(self) -> Result<T> {
        match self.outcome {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { error } => Err(Error::InvalidState(format!(
                "no value on a failed result ({})",
                error
            ))),
        }
    }

    /// Convert into a standard `Result`
    pub fn into_std(self) -> std::result::Result<T, ErrorInfo> {
        match self.outcome {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { error } => Err(error),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ValueResult<U> {
        match self.outcome {
            Outcome::Success { value } => ValueResult::success(f(value)),
            Outcome::Failure { error } => ValueResult::failure(error),
        }
    }
}

impl<T> From<Result<T>> for ValueResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::from_error(&e),
        }
    }
}

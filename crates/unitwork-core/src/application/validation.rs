//! Entity validation contract
//!
//! A [`ValidatableService`] decides whether an entity may be persisted.
//! Its verdict is a [`ValueResult<bool>`]:
//!
//! - `success(true)`: the entity satisfies every business rule
//! - `success(false)`: the entity is well formed but breaks a rule
//! - failure: no verdict could be reached (a lookup failed or timed out)
//!
//! A missing entity is a caller bug and is reported synchronously as
//! [`Error::InvalidArgument`], before any asynchronous work starts.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::result::ValueResult;

#[async_trait]
pub trait ValidatableService<E: Sync>: Send + Sync {
    /// Evaluate the business rules for a present entity
    ///
    /// Must not modify the entity. Rule failures are returned inside the
    /// result, never as a panic.
    async fn check(&self, entity: &E) -> ValueResult<bool>;

    /// Validate an entity that may be absent
    ///
    /// Returns `Err(InvalidArgument)` immediately when `entity` is `None`;
    /// otherwise returns the pending verdict.
    fn validate<'a>(&'a self, entity: Option<&'a E>) -> Result<BoxFuture<'a, ValueResult<bool>>> {
        let entity =
            entity.ok_or_else(|| Error::invalid_argument("entity", "entity cannot be null"))?;
        Ok(self.check(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::result::ErrorInfo;

    struct NonEmpty;

    #[async_trait]
    impl ValidatableService<String> for NonEmpty {
        async fn check(&self, entity: &String) -> ValueResult<bool> {
            ValueResult::success(!entity.is_empty())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl ValidatableService<String> for Unreachable {
        async fn check(&self, _entity: &String) -> ValueResult<bool> {
            ValueResult::failure(ErrorInfo::new(
                ErrorKind::ValidationIncomplete,
                "lookup service unavailable",
            ))
        }
    }

    #[tokio::test]
    async fn test_verdicts() {
        let service = NonEmpty;
        let good = "ok".to_string();
        let bad = String::new();

        let verdict = service.validate(Some(&good)).unwrap().await;
        assert!(*verdict.value().unwrap());

        let verdict = service.validate(Some(&bad)).unwrap().await;
        assert!(verdict.is_success());
        assert!(!*verdict.value().unwrap());
    }

    #[test]
    fn test_missing_entity_fails_synchronously() {
        // No runtime needed: the argument check happens before any future exists
        let err = NonEmpty.validate(None).err().expect("expected an error");
        assert!(matches!(err, Error::InvalidArgument { name: "entity", .. }));

        let err = Unreachable.validate(None).err().expect("expected an error");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_incomplete_is_not_false() {
        let entity = "anything".to_string();
        let verdict = Unreachable.validate(Some(&entity)).unwrap().await;

        assert!(verdict.is_failure());
        assert!(verdict.value().is_err());
        assert_eq!(
            verdict.error().unwrap().kind,
            ErrorKind::ValidationIncomplete
        );
    }

    #[tokio::test]
    async fn test_concurrent_validation() {
        let service = NonEmpty;
        let entities = vec!["a".to_string(), String::new(), "c".to_string()];

        let verdicts = futures_util::future::join_all(
            entities
                .iter()
                .map(|e| service.validate(Some(e)).unwrap()),
        )
        .await;

        let values: Vec<bool> = verdicts.into_iter().map(|v| *v.value().unwrap()).collect();
        assert_eq!(values, vec![true, false, true]);
    }
}

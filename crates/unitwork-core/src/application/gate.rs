//! Validate-then-stage
//!
//! [`ValidationGate`] couples a [`ValidatableService`] with a unit of work:
//! an entity change is registered only after a `true` verdict.

use tracing::debug;

use super::validation::ValidatableService;
use crate::domain::{ChangeOp, Entity, PendingChange};
use crate::error::{Error, Result};
use crate::result::ErrorInfo;
use crate::uow::{StorageEngine, UnitOfWork};

/// What happened to a change offered to the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Validated and registered with the unit of work
    Staged,
    /// The entity breaks a business rule; nothing was registered
    Rejected,
    /// No verdict could be reached; nothing was registered
    Inconclusive(ErrorInfo),
}

impl GateOutcome {
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationGate<V> {
    validator: V,
}

impl<V> ValidationGate<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Validate `entity` and, when valid, register `op` for it
    ///
    /// Deletes are validated too, so a rule set can refuse removals.
    pub async fn stage<E, S>(
        &self,
        uow: &mut UnitOfWork<S>,
        entity: Option<&E>,
        op: ChangeOp,
    ) -> Result<GateOutcome>
    where
        E: Entity,
        V: ValidatableService<E>,
        S: StorageEngine,
    {
        if uow.is_disposed() {
            return Err(Error::ObjectDisposed(format!(
                "unit of work {} (attempted to stage a change)",
                uow.session_id()
            )));
        }

        let verdict = self.validator.validate(entity)?.await;
        let Some(entity) = entity else {
            return Err(Error::invalid_argument("entity", "entity cannot be null"));
        };

        match verdict.into_std() {
            Ok(true) => {
                uow.register(PendingChange::for_entity(entity, op)?)?;
                Ok(GateOutcome::Staged)
            }
            Ok(false) => {
                debug!(kind = E::KIND, key = %entity.key(), op = %op, "Change rejected by validation");
                Ok(GateOutcome::Rejected)
            }
            Err(info) => Ok(GateOutcome::Inconclusive(info)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::RuleValidationService;
    use crate::domain::rule;
    use crate::error::ErrorKind;
    use crate::infrastructure::MemoryEngine;
    use crate::result::ValueResult;
    use async_trait::async_trait;
    use serde::Serialize;
    use std::sync::Arc;

    #[derive(Debug, Serialize)]
    struct Customer {
        id: u32,
        name: String,
    }

    impl Entity for Customer {
        const KIND: &'static str = "customer";

        fn key(&self) -> String {
            self.id.to_string()
        }
    }

    fn gate() -> ValidationGate<RuleValidationService<Customer>> {
        ValidationGate::new(
            RuleValidationService::new()
                .with_rule(rule("name non-empty", |c: &Customer| !c.name.is_empty())),
        )
    }

    fn uow() -> UnitOfWork<MemoryEngine> {
        UnitOfWork::new(Arc::new(MemoryEngine::new()))
    }

    #[tokio::test]
    async fn test_valid_entity_is_staged() {
        let mut uow = uow();
        let entity = Customer {
            id: 2,
            name: "ok".to_string(),
        };

        let outcome = gate()
            .stage(&mut uow, Some(&entity), ChangeOp::Insert)
            .await
            .unwrap();
        assert!(outcome.is_staged());
        assert_eq!(uow.pending_count(), 1);
        assert!(uow.pending().contains("customer", "2"));
    }

    #[tokio::test]
    async fn test_invalid_entity_is_not_staged() {
        let mut uow = uow();
        let entity = Customer {
            id: 1,
            name: String::new(),
        };

        let outcome = gate()
            .stage(&mut uow, Some(&entity), ChangeOp::Insert)
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Rejected);
        assert_eq!(uow.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_entity_is_invalid_argument() {
        let mut uow = uow();

        let err = gate()
            .stage::<Customer, _>(&mut uow, None, ChangeOp::Insert)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(uow.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_inconclusive_verdict_is_not_staged() {
        struct Offline;

        #[async_trait]
        impl ValidatableService<Customer> for Offline {
            async fn check(&self, _entity: &Customer) -> ValueResult<bool> {
                ValueResult::from_error(&Error::ValidationIncomplete("offline".to_string()))
            }
        }

        let mut uow = uow();
        let entity = Customer {
            id: 3,
            name: "ok".to_string(),
        };

        let outcome = ValidationGate::new(Offline)
            .stage(&mut uow, Some(&entity), ChangeOp::Upsert)
            .await
            .unwrap();
        match outcome {
            GateOutcome::Inconclusive(info) => {
                assert_eq!(info.kind, ErrorKind::ValidationIncomplete)
            }
            other => panic!("expected inconclusive, got {:?}", other),
        }
        assert_eq!(uow.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disposed_unit_of_work() {
        let mut uow = uow();
        uow.dispose().await.unwrap();
        let entity = Customer {
            id: 2,
            name: "ok".to_string(),
        };

        let err = gate()
            .stage(&mut uow, Some(&entity), ChangeOp::Insert)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectDisposed);
    }
}

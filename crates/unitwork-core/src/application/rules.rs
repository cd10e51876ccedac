//! Rule-driven validation service
//!
//! Combines synchronous [`Specification`]s with [`AsyncRule`]s that consult
//! external state. Synchronous rules run first; async rules run only when
//! every synchronous rule holds, each bounded by the configured timeout.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::validation::ValidatableService;
use crate::config::ValidationSettings;
use crate::domain::Specification;
use crate::error::{Error, Result};
use crate::result::ValueResult;

/// A named rule that needs to await external state
#[async_trait]
pub trait AsyncRule<E: Sync>: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(false)` means the rule is violated; `Err` means no verdict
    async fn evaluate(&self, entity: &E) -> Result<bool>;
}

/// Names of the rules an entity violates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// [`ValidatableService`] built from named rules
pub struct RuleValidationService<E> {
    rules: Vec<Box<dyn Specification<E>>>,
    async_rules: Vec<Box<dyn AsyncRule<E>>>,
    rule_timeout: Duration,
}

impl<E: Sync> RuleValidationService<E> {
    pub fn new() -> Self {
        Self::from_settings(&ValidationSettings::default())
    }

    pub fn from_settings(settings: &ValidationSettings) -> Self {
        Self {
            rules: Vec::new(),
            async_rules: Vec::new(),
            rule_timeout: settings.rule_timeout(),
        }
    }

    pub fn with_rule<S: Specification<E> + 'static>(mut self, rule: S) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn with_async_rule<R: AsyncRule<E> + 'static>(mut self, rule: R) -> Self {
        self.async_rules.push(Box::new(rule));
        self
    }

    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = timeout;
        self
    }

    pub fn rule_timeout(&self) -> Duration {
        self.rule_timeout
    }

    /// Evaluate every rule and name the violated ones
    ///
    /// Fails with [`Error::ValidationIncomplete`] when an async rule errors
    /// or exceeds the rule timeout.
    pub async fn report(&self, entity: &E) -> Result<ValidationReport> {
        let mut violations: Vec<String> = self
            .rules
            .iter()
            .flat_map(|rule| rule.violations(entity))
            .collect();

        if !violations.is_empty() {
            return Ok(ValidationReport { violations });
        }

        for rule in &self.async_rules {
            match tokio::time::timeout(self.rule_timeout, rule.evaluate(entity)).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => violations.push(rule.name().to_string()),
                Ok(Err(e)) => {
                    return Err(Error::ValidationIncomplete(format!(
                        "rule '{}' could not be evaluated: {}",
                        rule.name(),
                        e
                    )));
                }
                Err(_) => {
                    return Err(Error::ValidationIncomplete(format!(
                        "rule '{}' timed out after {:?}",
                        rule.name(),
                        self.rule_timeout
                    )));
                }
            }
        }

        Ok(ValidationReport { violations })
    }
}

impl<E: Sync> Default for RuleValidationService<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Sync> fmt::Debug for RuleValidationService<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        let async_rules: Vec<&str> = self.async_rules.iter().map(|r| r.name()).collect();
        f.debug_struct("RuleValidationService")
            .field("rules", &rules)
            .field("async_rules", &async_rules)
            .field("rule_timeout", &self.rule_timeout)
            .finish()
    }
}

#[async_trait]
impl<E: Sync> ValidatableService<E> for RuleValidationService<E> {
    async fn check(&self, entity: &E) -> ValueResult<bool> {
        match self.report(entity).await {
            Ok(report) => {
                if !report.is_valid() {
                    debug!(violations = ?report.violations, "Entity failed validation");
                }
                ValueResult::success(report.is_valid())
            }
            Err(e) => {
                warn!(error = %e, "Validation incomplete");
                ValueResult::from_error(&e)
            }
        }
    }
}

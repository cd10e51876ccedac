//! Named business rules
//!
//! Rules are predicate objects with a name, composable with `and`, `or`
//! and `not`. A failing composite reports which leaf rules were violated
//! so callers can tell the user why an entity was refused.

use std::marker::PhantomData;
use std::sync::Arc;

/// A named business rule over `T`
pub trait Specification<T>: Send + Sync {
    /// Name reported when the rule is violated
    fn name(&self) -> &str;

    /// Check if the candidate satisfies this rule
    fn is_satisfied_by(&self, candidate: &T) -> bool;

    /// Names of the rules the candidate violates; empty when satisfied
    fn violations(&self, candidate: &T) -> Vec<String> {
        if self.is_satisfied_by(candidate) {
            Vec::new()
        } else {
            vec![self.name().to_string()]
        }
    }

    /// Both rules must hold
    fn and<S: Specification<T> + 'static>(self, other: S) -> And<T>
    where
        Self: Sized + 'static,
    {
        And::new(Arc::new(self), Arc::new(other))
    }

    /// At least one rule must hold
    fn or<S: Specification<T> + 'static>(self, other: S) -> Or<T>
    where
        Self: Sized + 'static,
    {
        Or::new(Arc::new(self), Arc::new(other))
    }

    /// The rule must not hold
    fn not(self) -> Not<T>
    where
        Self: Sized + 'static,
    {
        Not::new(Arc::new(self))
    }
}

pub struct And<T> {
    name: String,
    left: Arc<dyn Specification<T>>,
    right: Arc<dyn Specification<T>>,
}

impl<T> And<T> {
    fn new(left: Arc<dyn Specification<T>>, right: Arc<dyn Specification<T>>) -> Self {
        Self {
            name: format!("({} and {})", left.name(), right.name()),
            left,
            right,
        }
    }
}

impl<T: Send + Sync> Specification<T> for And<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) && self.right.is_satisfied_by(candidate)
    }

    fn violations(&self, candidate: &T) -> Vec<String> {
        let mut violations = self.left.violations(candidate);
        violations.extend(self.right.violations(candidate));
        violations
    }
}

pub struct Or<T> {
    name: String,
    left: Arc<dyn Specification<T>>,
    right: Arc<dyn Specification<T>>,
}

impl<T> Or<T> {
    fn new(left: Arc<dyn Specification<T>>, right: Arc<dyn Specification<T>>) -> Self {
        Self {
            name: format!("({} or {})", left.name(), right.name()),
            left,
            right,
        }
    }
}

impl<T: Send + Sync> Specification<T> for Or<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) || self.right.is_satisfied_by(candidate)
    }
}

pub struct Not<T> {
    name: String,
    inner: Arc<dyn Specification<T>>,
}

impl<T> Not<T> {
    fn new(inner: Arc<dyn Specification<T>>) -> Self {
        Self {
            name: format!("not {}", inner.name()),
            inner,
        }
    }
}

impl<T: Send + Sync> Specification<T> for Not<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied_by(&self, candidate: &T) -> bool {
        !self.inner.is_satisfied_by(candidate)
    }
}

/// A rule backed by a closure
pub struct Rule<T, F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    name: String,
    predicate: F,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> Specification<T> for Rule<T, F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (self.predicate)(candidate)
    }
}

/// Build a named rule from a closure
pub fn rule<T, F>(name: impl Into<String>, predicate: F) -> Rule<T, F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    Rule {
        name: name.into(),
        predicate,
        _phantom: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Customer {
        name: String,
        credit_limit: i64,
        blocked: bool,
    }

    fn customer(name: &str, credit_limit: i64, blocked: bool) -> Customer {
        Customer {
            name: name.to_string(),
            credit_limit,
            blocked,
        }
    }

    struct NotBlocked;

    impl Specification<Customer> for NotBlocked {
        fn name(&self) -> &str {
            "not_blocked"
        }

        fn is_satisfied_by(&self, c: &Customer) -> bool {
            !c.blocked
        }
    }

    #[test]
    fn test_closure_rule() {
        let named = rule("name_present", |c: &Customer| !c.name.trim().is_empty());
        assert!(named.is_satisfied_by(&customer("ok", 0, false)));
        assert_eq!(named.violations(&customer("", 0, false)), vec!["name_present"]);
    }

    #[test]
    fn test_and_collects_each_violation() {
        let rules = rule("name_present", |c: &Customer| !c.name.is_empty())
            .and(rule("credit_non_negative", |c: &Customer| c.credit_limit >= 0))
            .and(NotBlocked);

        assert!(rules.is_satisfied_by(&customer("ok", 10, false)));
        assert_eq!(
            rules.violations(&customer("", -1, true)),
            vec!["name_present", "credit_non_negative", "not_blocked"]
        );
        assert_eq!(
            rules.violations(&customer("ok", -1, false)),
            vec!["credit_non_negative"]
        );
    }

    #[test]
    fn test_or_reports_composite_name() {
        let rules = NotBlocked.or(rule("vip", |c: &Customer| c.credit_limit > 1_000));

        assert!(rules.is_satisfied_by(&customer("x", 5_000, true)));
        assert!(rules.is_satisfied_by(&customer("x", 0, false)));
        assert_eq!(
            rules.violations(&customer("x", 0, true)),
            vec!["(not_blocked or vip)"]
        );
    }

    #[test]
    fn test_not_inverts() {
        let rules = NotBlocked.not();
        assert_eq!(rules.name(), "not not_blocked");
        assert!(rules.is_satisfied_by(&customer("x", 0, true)));
        assert!(!rules.is_satisfied_by(&customer("x", 0, false)));
    }
}

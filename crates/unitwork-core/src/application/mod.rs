//! Application layer
//!
//! Validation services that decide whether an entity may be persisted, and
//! the gate that stages validated changes on a unit of work.

pub mod gate;
pub mod rules;
pub mod validation;

pub use gate::{GateOutcome, ValidationGate};
pub use rules::{AsyncRule, RuleValidationService, ValidationReport};
pub use validation::ValidatableService;

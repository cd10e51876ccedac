//! Domain layer
//!
//! Engine-agnostic model: entities, the pending changes repositories
//! register, and the business rules that decide what may be persisted.

pub mod change;
pub mod entity;
pub mod specification;

pub use change::{ChangeOp, ChangeSet, ChangeSummary, PendingChange};
pub use entity::Entity;
pub use specification::{Rule, Specification, rule};

//! Infrastructure layer
//!
//! Storage engines that live outside the SQLite storage module.

pub mod memory;

pub use memory::{MemoryEngine, MemoryTransaction};

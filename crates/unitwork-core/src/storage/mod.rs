//! Storage layer - SQLite
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//! - `sqlite`: `StorageEngine` implementation over the pool
//!
//! # Usage
//!
//! ```ignore
//! use unitwork_core::storage::{Database, SqliteEngine};
//!
//! // Create an in-memory database for testing
//! let engine = SqliteEngine::new(Database::in_memory().await?);
//! ```

pub mod database;
pub mod migrations;
pub mod sqlite;

// Re-export commonly used types
pub use database::{Database, DatabaseConfig};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
pub use sqlite::{SqliteEngine, SqliteTransaction};

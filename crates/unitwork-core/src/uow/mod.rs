//! Unit of work
//!
//! Groups the changes registered by any number of repositories into one
//! atomic save, and owns the engine transaction behind it.
//!
//! # Architecture
//!
//! - `engine`: `StorageEngine` / `TransactionHandle` / `CommittedReader` seam
//! - `session`: per-instance state and the lifecycle enum
//! - `unit_of_work`: the `UnitOfWork` state machine
//! - `factory`: one unit of work per logical operation, scoped disposal
//!
//! # Usage
//!
//! ```ignore
//! use unitwork_core::uow::UnitOfWorkFactory;
//! use unitwork_core::storage::SqliteEngine;
//!
//! let factory = UnitOfWorkFactory::new(SqliteEngine::in_memory().await?);
//! let mut uow = factory.create();
//!
//! uow.register(PendingChange::insert(&customer)?)?;
//! let affected = uow.save_changes().await?;
//! ```

mod blocking;
pub mod engine;
pub mod factory;
pub mod session;
pub mod unit_of_work;

pub use engine::{CommittedReader, StorageEngine, TransactionHandle};
pub use factory::UnitOfWorkFactory;
pub use session::{Session, TransactionInfo, UnitOfWorkState};
pub use unit_of_work::UnitOfWork;

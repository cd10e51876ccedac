//! Creates independent units of work over a shared engine

use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use super::engine::StorageEngine;
use super::unit_of_work::UnitOfWork;
use crate::error::Result;

/// Hands out one unit of work per logical operation
///
/// Instances share the engine (and so its connection pool) but nothing
/// else; they need no coordination between each other.
pub struct UnitOfWorkFactory<S> {
    engine: Arc<S>,
}

impl<S: StorageEngine> UnitOfWorkFactory<S> {
    pub fn new(engine: S) -> Self {
        Self::from_shared(Arc::new(engine))
    }

    pub fn from_shared(engine: Arc<S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<S> {
        &self.engine
    }

    /// Create a unit of work with a fresh session
    pub fn create(&self) -> UnitOfWork<S> {
        UnitOfWork::new(Arc::clone(&self.engine))
    }

    /// Run `work` inside a unit of work that is disposed on every exit path
    ///
    /// ```ignore
    /// let saved = factory
    ///     .scope(|uow| Box::pin(async move {
    ///         uow.register(PendingChange::insert(&customer)?)?;
    ///         uow.save_changes().await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn scope<R, F>(&self, work: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a mut UnitOfWork<S>) -> BoxFuture<'a, Result<R>>,
    {
        let mut uow = self.create();
        let outcome = work(&mut uow).await;
        uow.dispose().await?;
        outcome
    }
}

impl<S> Clone for UnitOfWorkFactory<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: StorageEngine> fmt::Debug for UnitOfWorkFactory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkFactory")
            .field("engine", &self.engine.name())
            .finish()
    }
}

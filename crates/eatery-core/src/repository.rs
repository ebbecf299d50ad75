//! Aggregate repository: the type-safe load/save facade used by command
//! handlers.

use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::store::AggregateStore;

/// Loads and saves aggregates of type `A` through an [`AggregateStore`]
/// chain (typically a `SnapshotStore` wrapping an `EventStore`).
pub struct AggregateRepository<A> {
    store: Arc<dyn AggregateStore>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _aggregate: PhantomData,
        }
    }
}

impl<A: AggregateRoot> AggregateRepository<A> {
    /// Creates a new repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }

    /// Loads the aggregate with `id`.
    ///
    /// A stream with no events yields an aggregate at version 0; whether that
    /// means "not found" or "new" is the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns whatever the store chain reports.
    pub async fn load(&self, id: Uuid) -> Result<A, DomainError> {
        let mut aggregate = A::new(id);
        self.store.load(&mut aggregate).await?;
        Ok(aggregate)
    }

    /// Persists the aggregate's pending events and clears the buffer.
    ///
    /// On `DomainError::Conflict` (or any other failure before the events are
    /// written) the buffer is left intact so the caller can reload and retry.
    /// On `DomainError::SnapshotFailed` the events are already persisted, so
    /// the buffer is cleared before the warning is returned.
    ///
    /// # Errors
    ///
    /// Returns whatever the store chain reports.
    pub async fn save(&self, aggregate: &mut A) -> Result<(), DomainError> {
        if aggregate.uncommitted_events().is_empty() {
            return Ok(());
        }

        match self.store.save(aggregate).await {
            Ok(()) => {
                aggregate.commit_events();
                Ok(())
            }
            Err(e) if e.is_warning() => {
                aggregate.commit_events();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

//! Query-side tables kept up to date by domain event handlers.
//!
//! A read model is written inside the same unit of work as the events that
//! feed it, so a rolled-back command leaves it untouched.

use std::cmp::Ordering;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

/// One row of a read model, keyed by the aggregate it describes.
pub trait ReadModelRow: Clone + Send + Sync + 'static {
    /// Name of the table the rows live in.
    const TABLE: &'static str;

    /// The aggregate identifier the row is keyed by.
    fn row_id(&self) -> Uuid;

    /// Order in which [`ReadModelRepository::list`] returns rows.
    fn listing_order(&self, other: &Self) -> Ordering;
}

/// Storage of one read model.
#[async_trait]
pub trait ReadModelRepository<R: ReadModelRow>: Send + Sync {
    /// Inserts the row or replaces the row with the same id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if the storage is unavailable.
    async fn upsert(&self, row: &R) -> Result<(), DomainError>;

    /// Lists every row in [`ReadModelRow::listing_order`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if the storage is unavailable, or
    /// `DomainError::Serialization` if a stored row cannot be read back.
    async fn list(&self) -> Result<Vec<R>, DomainError>;
}

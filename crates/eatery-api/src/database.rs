//! Per-request transaction scoping.
//!
//! Routes ask a [`Database`] for a [`UnitOfWorkScope`], build their stores
//! from it and commit at the end. Dropping the scope without committing,
//! including when the request times out, rolls everything back.

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_event_store::error::map_sqlx_error;
use eatery_event_store::transaction::{PgTransactionManager, SharedTransaction};
use eatery_restaurants::application::unit_of_work::RestaurantStores;
use sqlx::PgPool;

/// One open transaction.
#[async_trait]
pub trait UnitOfWorkScope: Send {
    /// Restaurant stores bound to this transaction.
    fn restaurant_stores(&self) -> RestaurantStores;

    /// Commits every write made through the scope's stores.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every write made through the scope's stores.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// Hands out transactions and autocommit stores.
#[async_trait]
pub trait Database: Send + Sync {
    /// Starts a transaction.
    async fn begin(&self) -> Result<Box<dyn UnitOfWorkScope>, DomainError>;

    /// Restaurant stores outside any transaction, for queries.
    fn restaurant_stores(&self) -> RestaurantStores;

    /// Checks that the database answers.
    async fn ping(&self) -> Result<(), DomainError>;
}

/// PostgreSQL-backed [`Database`].
#[derive(Debug, Clone)]
pub struct PgDatabase {
    transactions: PgTransactionManager,
}

impl PgDatabase {
    /// Creates a new `PgDatabase`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            transactions: PgTransactionManager::new(pool),
        }
    }
}

struct PgUnitOfWorkScope {
    tx: SharedTransaction,
}

#[async_trait]
impl UnitOfWorkScope for PgUnitOfWorkScope {
    fn restaurant_stores(&self) -> RestaurantStores {
        RestaurantStores::postgres(self.tx.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWorkScope>, DomainError> {
        let tx = self.transactions.begin().await?;
        Ok(Box::new(PgUnitOfWorkScope { tx }))
    }

    fn restaurant_stores(&self) -> RestaurantStores {
        RestaurantStores::postgres(self.transactions.pool().clone())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(self.transactions.pool())
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

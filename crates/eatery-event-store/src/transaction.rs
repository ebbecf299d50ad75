//! Transaction scoping for the PostgreSQL stores.
//!
//! A unit of work starts with [`PgTransactionManager::begin`]. Stores built
//! from the [`SharedTransaction`] it hands out all write through the same
//! connection, so events, snapshots and outbox rows commit or roll back
//! together.

use std::fmt;
use std::sync::Arc;

use eatery_core::error::DomainError;
use sqlx::postgres::{PgArguments, PgQueryResult, PgRow};
use sqlx::query::Query;
use sqlx::{Connection, PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::map_sqlx_error;

/// A database transaction shared by every store of one unit of work.
///
/// Dropping the last clone without committing rolls the transaction back.
#[derive(Clone)]
pub struct SharedTransaction {
    inner: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl fmt::Debug for SharedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransaction").finish_non_exhaustive()
    }
}

impl SharedTransaction {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Commits the transaction. Every clone becomes unusable afterwards.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if the commit fails or the
    /// transaction was already finished.
    pub async fn commit(&self) -> Result<(), DomainError> {
        let tx = self.inner.lock().await.take().ok_or_else(finished)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    /// Rolls the transaction back. A finished transaction is left alone.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if the rollback fails.
    pub async fn rollback(&self) -> Result<(), DomainError> {
        let Some(tx) = self.inner.lock().await.take() else {
            return Ok(());
        };
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn finished() -> DomainError {
    DomainError::Transient("transaction already finished".into())
}

fn finished_sqlx() -> sqlx::Error {
    sqlx::Error::Protocol("transaction already finished".into())
}

/// Where a store sends its statements: straight to the pool (each statement
/// autocommits) or through a unit of work's transaction.
#[derive(Debug, Clone)]
pub enum PgScope {
    /// Autocommit against the pool.
    Pool(PgPool),
    /// Inside a shared transaction.
    Transaction(SharedTransaction),
}

impl From<PgPool> for PgScope {
    fn from(pool: PgPool) -> Self {
        Self::Pool(pool)
    }
}

impl From<SharedTransaction> for PgScope {
    fn from(tx: SharedTransaction) -> Self {
        Self::Transaction(tx)
    }
}

impl PgScope {
    /// Executes `query`.
    ///
    /// # Errors
    ///
    /// Returns the sqlx error unchanged so callers can inspect SQLSTATE codes.
    pub async fn execute(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, sqlx::Error> {
        match self {
            Self::Pool(pool) => query.execute(pool).await,
            Self::Transaction(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_sqlx)?;
                query.execute(&mut **conn).await
            }
        }
    }

    /// Fetches every row of `query`.
    ///
    /// # Errors
    ///
    /// Returns the sqlx error unchanged.
    pub async fn fetch_all(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Vec<PgRow>, sqlx::Error> {
        match self {
            Self::Pool(pool) => query.fetch_all(pool).await,
            Self::Transaction(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_sqlx)?;
                query.fetch_all(&mut **conn).await
            }
        }
    }

    /// Fetches at most one row of `query`.
    ///
    /// # Errors
    ///
    /// Returns the sqlx error unchanged.
    pub async fn fetch_optional(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Option<PgRow>, sqlx::Error> {
        match self {
            Self::Pool(pool) => query.fetch_optional(pool).await,
            Self::Transaction(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_sqlx)?;
                query.fetch_optional(&mut **conn).await
            }
        }
    }

    /// Runs `query` so that its failure leaves the surrounding transaction
    /// usable: inside a transaction it is wrapped in a savepoint.
    ///
    /// # Errors
    ///
    /// Returns the sqlx error of the statement or of the savepoint handling.
    pub async fn execute_in_savepoint(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, sqlx::Error> {
        match self {
            Self::Pool(pool) => query.execute(pool).await,
            Self::Transaction(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_sqlx)?;
                let mut savepoint = Connection::begin(&mut **conn).await?;
                match query.execute(&mut *savepoint).await {
                    Ok(result) => {
                        savepoint.commit().await?;
                        Ok(result)
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Begins, commits and rolls back units of work.
#[derive(Debug, Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Creates a new `PgTransactionManager`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The pool transactions are started from.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Starts a transaction. It rolls back when the last clone is dropped
    /// without [`SharedTransaction::commit`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if no connection can be acquired.
    pub async fn begin(&self) -> Result<SharedTransaction, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(SharedTransaction::new(tx))
    }
}

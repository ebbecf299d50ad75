//! `PostgreSQL` implementation of the `InboxStore` trait.

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::message::{InboxStore, Message, SaveOutcome};
use tracing::instrument;

use crate::error::{is_unique_violation, map_sqlx_error};
use crate::schema::Schema;
use crate::transaction::PgScope;

/// PostgreSQL-backed inbox.
#[derive(Debug, Clone)]
pub struct PgInboxStore {
    scope: PgScope,
    table: String,
}

impl PgInboxStore {
    /// Creates a new `PgInboxStore` over `schema.inbox`.
    #[must_use]
    pub fn new(scope: impl Into<PgScope>, schema: Schema) -> Self {
        Self {
            scope: scope.into(),
            table: schema.inbox(),
        }
    }
}

#[async_trait]
impl InboxStore for PgInboxStore {
    #[instrument(skip_all, fields(table = %self.table, message_id = %message.id), err)]
    async fn save(&self, message: &Message) -> Result<SaveOutcome, DomainError> {
        let sql = format!(
            "INSERT INTO {} (id, name, subject, data) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
            self.table
        );

        let result = self
            .scope
            .execute(
                sqlx::query(&sql)
                    .bind(&message.id)
                    .bind(&message.name)
                    .bind(&message.subject)
                    .bind(&message.data),
            )
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                tracing::debug!("message already processed");
                Ok(SaveOutcome::Duplicate)
            }
            Ok(_) => Ok(SaveOutcome::Stored),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("message already processed");
                Ok(SaveOutcome::Duplicate)
            }
            Err(e) => Err(map_sqlx_error("save_inbox", e)),
        }
    }
}

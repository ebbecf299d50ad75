//! `PostgreSQL` implementation of the `OutboxStore` trait.

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::message::{Message, Metadata, OutboxStore, SaveOutcome};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;

use crate::error::{is_unique_violation, map_sqlx_error};
use crate::schema::Schema;
use crate::transaction::PgScope;

/// PostgreSQL-backed outbox.
///
/// Rows are drained in insertion order (`seq`). Unsent rows are claimed with
/// `FOR UPDATE SKIP LOCKED`, so processors sharing the table inside their own
/// transactions never pick up the same row.
#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    scope: PgScope,
    table: String,
}

impl PgOutboxStore {
    /// Creates a new `PgOutboxStore` over `schema.outbox`.
    #[must_use]
    pub fn new(scope: impl Into<PgScope>, schema: Schema) -> Self {
        Self {
            scope: scope.into(),
            table: schema.outbox(),
        }
    }
}

fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    let metadata: Value = row.try_get("metadata")?;
    let metadata = match metadata {
        Value::Object(map) => map,
        _ => Metadata::new(),
    };
    Ok(Message {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        subject: row.try_get("subject")?,
        data: row.try_get("data")?,
        metadata,
        sent_at: row.try_get("sent_at")?,
    })
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    #[instrument(skip_all, fields(table = %self.table, message_id = %message.id), err)]
    async fn save(&self, message: &Message) -> Result<SaveOutcome, DomainError> {
        let sql = format!(
            "INSERT INTO {} (id, name, subject, data, metadata) \
             VALUES ($1, $2, $3, $4, $5) \
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
                    .bind(&message.data)
                    .bind(Value::Object(message.metadata.clone())),
            )
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                tracing::debug!("duplicate outbox message");
                Ok(SaveOutcome::Duplicate)
            }
            Ok(_) => Ok(SaveOutcome::Stored),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("duplicate outbox message");
                Ok(SaveOutcome::Duplicate)
            }
            Err(e) => Err(map_sqlx_error("save_outbox", e)),
        }
    }

    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn find_unpublished(&self, limit: i64) -> Result<Vec<Message>, DomainError> {
        let sql = format!(
            "SELECT id, name, subject, data, metadata, sent_at \
             FROM {} \
             WHERE sent_at IS NULL \
             ORDER BY seq ASC \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED",
            self.table
        );

        let rows = self
            .scope
            .fetch_all(sqlx::query(&sql).bind(limit))
            .await
            .map_err(|e| map_sqlx_error("find_unpublished", e))?;

        rows.iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("find_unpublished", e))
    }

    #[instrument(skip_all, fields(table = %self.table, count = ids.len()), err)]
    async fn mark_published(&self, ids: &[String]) -> Result<(), DomainError> {
        if ids.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE {} SET sent_at = now() WHERE id = ANY($1) AND sent_at IS NULL",
            self.table
        );

        self.scope
            .execute(sqlx::query(&sql).bind(ids))
            .await
            .map_err(|e| map_sqlx_error("mark_published", e))?;

        Ok(())
    }
}

//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::event_store::{EventRepository, StoredEvent};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{is_unique_violation, map_sqlx_error, violated_constraint};
use crate::schema::Schema;
use crate::transaction::PgScope;

/// Unique key guarding stream versions.
const STREAM_VERSION_KEY: &str = "events_stream_version_key";

/// PostgreSQL-backed event repository.
///
/// Optimistic concurrency is enforced by the unique key on
/// `(stream_id, stream_name, stream_version)`: the insert that collides with
/// another writer's row fails and is reported as `DomainError::Conflict`.
/// A reused event id violates a different constraint and is a
/// `DomainError::Validation` error.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    scope: PgScope,
    table: String,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository` over `schema.events`.
    #[must_use]
    pub fn new(scope: impl Into<PgScope>, schema: Schema) -> Self {
        Self {
            scope: scope.into(),
            table: schema.events(),
        }
    }
}

fn stored_event_from_row(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        stream_id: row.try_get("stream_id")?,
        stream_name: row.try_get("stream_name")?,
        stream_version: row.try_get("stream_version")?,
        event_id: row.try_get("event_id")?,
        event_name: row.try_get("event_name")?,
        event_data: row.try_get("event_data")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn load_events(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let sql = format!(
            "SELECT stream_id, stream_name, stream_version, event_id, event_name, event_data, occurred_at \
             FROM {} \
             WHERE stream_id = $1 AND stream_name = $2 AND stream_version > $3 \
             ORDER BY stream_version ASC",
            self.table
        );

        let rows = self
            .scope
            .fetch_all(
                sqlx::query(&sql)
                    .bind(stream_id)
                    .bind(stream_name)
                    .bind(after_version),
            )
            .await
            .map_err(|e| map_sqlx_error("load_events", e))?;

        rows.iter()
            .map(stored_event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("load_events", e))
    }

    #[instrument(skip_all, fields(table = %self.table, count = events.len()), err)]
    async fn append_events(&self, events: &[StoredEvent]) -> Result<(), DomainError> {
        let sql = format!(
            "INSERT INTO {} \
             (stream_id, stream_name, stream_version, event_id, event_name, event_data, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table
        );

        for event in events {
            let result = self
                .scope
                .execute(
                    sqlx::query(&sql)
                        .bind(event.stream_id)
                        .bind(&event.stream_name)
                        .bind(event.stream_version)
                        .bind(event.event_id)
                        .bind(&event.event_name)
                        .bind(&event.event_data)
                        .bind(event.occurred_at),
                )
                .await;

            match result {
                Ok(_) => {}
                Err(e)
                    if is_unique_violation(&e)
                        && violated_constraint(&e) == Some(STREAM_VERSION_KEY) =>
                {
                    return Err(DomainError::Conflict {
                        stream_id: event.stream_id,
                        stream_name: event.stream_name.clone(),
                        version: event.stream_version,
                    });
                }
                Err(e) if is_unique_violation(&e) => {
                    return Err(DomainError::Validation(format!(
                        "event {} is already stored",
                        event.event_id
                    )));
                }
                Err(e) => return Err(map_sqlx_error("append_events", e)),
            }
        }

        Ok(())
    }
}

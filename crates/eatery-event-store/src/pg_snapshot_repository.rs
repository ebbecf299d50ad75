//! `PostgreSQL` implementation of the `SnapshotRepository` trait.

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::snapshot::{SnapshotRecord, SnapshotRepository};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use crate::error::map_sqlx_error;
use crate::schema::Schema;
use crate::transaction::PgScope;

/// PostgreSQL-backed snapshot repository. Keeps one row per stream.
#[derive(Debug, Clone)]
pub struct PgSnapshotRepository {
    scope: PgScope,
    table: String,
}

impl PgSnapshotRepository {
    /// Creates a new `PgSnapshotRepository` over `schema.snapshots`.
    #[must_use]
    pub fn new(scope: impl Into<PgScope>, schema: Schema) -> Self {
        Self {
            scope: scope.into(),
            table: schema.snapshots(),
        }
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn load_latest(
        &self,
        stream_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<SnapshotRecord>, DomainError> {
        let sql = format!(
            "SELECT stream_id, stream_name, stream_version, snapshot_name, snapshot_data \
             FROM {} \
             WHERE stream_id = $1 AND stream_name = $2 \
             ORDER BY stream_version DESC \
             LIMIT 1",
            self.table
        );

        let row = self
            .scope
            .fetch_optional(sqlx::query(&sql).bind(stream_id).bind(stream_name))
            .await
            .map_err(|e| map_sqlx_error("load_latest", e))?;

        row.map(|row| {
            Ok::<_, sqlx::Error>(SnapshotRecord {
                stream_id: row.try_get("stream_id")?,
                stream_name: row.try_get("stream_name")?,
                stream_version: row.try_get("stream_version")?,
                snapshot_name: row.try_get("snapshot_name")?,
                snapshot_data: row.try_get("snapshot_data")?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx_error("load_latest", e))
    }

    /// Upserts inside a savepoint so a failure does not abort the
    /// surrounding transaction. An older version never replaces a newer one.
    #[instrument(
        skip_all,
        fields(table = %self.table, stream_id = %record.stream_id, version = record.stream_version),
        err
    )]
    async fn save(&self, record: &SnapshotRecord) -> Result<(), DomainError> {
        let sql = format!(
            "INSERT INTO {table} \
             (stream_id, stream_name, stream_version, snapshot_name, snapshot_data) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (stream_id, stream_name) DO UPDATE SET \
                 stream_version = EXCLUDED.stream_version, \
                 snapshot_name = EXCLUDED.snapshot_name, \
                 snapshot_data = EXCLUDED.snapshot_data \
             WHERE {table}.stream_version < EXCLUDED.stream_version",
            table = self.table
        );

        self.scope
            .execute_in_savepoint(
                sqlx::query(&sql)
                    .bind(record.stream_id)
                    .bind(&record.stream_name)
                    .bind(record.stream_version)
                    .bind(&record.snapshot_name)
                    .bind(&record.snapshot_data),
            )
            .await
            .map_err(|e| map_sqlx_error("save_snapshot", e))?;

        Ok(())
    }
}

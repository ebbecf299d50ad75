//! Event store: appends and replays ordered event streams.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::aggregate::{EventSourced, RecordedEvent};
use crate::error::DomainError;
use crate::registry::Registry;
use crate::store::AggregateStore;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Stream this event belongs to.
    pub stream_id: Uuid,
    /// Stream (aggregate type) name.
    pub stream_name: String,
    /// Position within the stream, contiguous from 1.
    pub stream_version: i64,
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Registry key of the payload.
    pub event_name: String,
    /// Encoded payload.
    pub event_data: Vec<u8>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Row-level access to the events table.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Loads the events of `(stream_id, stream_name)` with a version greater
    /// than `after_version`, ordered by version ascending.
    async fn load_events(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Inserts `events` in order. The first insert that collides with an
    /// existing `(stream_id, stream_name, stream_version)` fails with
    /// `DomainError::Conflict`; rows inserted before it are kept.
    async fn append_events(&self, events: &[StoredEvent]) -> Result<(), DomainError>;
}

/// [`AggregateStore`] that replays and appends through an [`EventRepository`],
/// encoding payloads with the [`Registry`].
#[derive(Clone)]
pub struct EventStore {
    events: Arc<dyn EventRepository>,
    registry: Arc<Registry>,
}

impl EventStore {
    /// Creates a new `EventStore`.
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, registry: Arc<Registry>) -> Self {
        Self { events, registry }
    }
}

#[async_trait]
impl AggregateStore for EventStore {
    #[instrument(
        skip_all,
        fields(
            stream_id = %aggregate.stream_id(),
            stream_name = aggregate.stream_name(),
            from_version = aggregate.stream_version()
        ),
        err
    )]
    async fn load(&self, aggregate: &mut dyn EventSourced) -> Result<(), DomainError> {
        let rows = self
            .events
            .load_events(
                aggregate.stream_id(),
                aggregate.stream_name(),
                aggregate.stream_version(),
            )
            .await?;

        tracing::debug!(count = rows.len(), "replaying events");

        for row in rows {
            let payload = self.registry.deserialize(&row.event_name, &row.event_data)?;
            aggregate.load_event(RecordedEvent {
                event_id: row.event_id,
                event_name: row.event_name,
                version: row.stream_version,
                occurred_at: row.occurred_at,
                payload,
            })?;
        }

        Ok(())
    }

    #[instrument(
        skip_all,
        fields(
            stream_id = %aggregate.stream_id(),
            stream_name = aggregate.stream_name(),
            version = aggregate.stream_version()
        ),
        err
    )]
    async fn save(&self, aggregate: &mut dyn EventSourced) -> Result<(), DomainError> {
        let stream_id = aggregate.stream_id();
        let stream_name = aggregate.stream_name();
        let mut version = aggregate.stream_version();

        let mut rows = Vec::new();
        for pending in aggregate.pending_events() {
            version += 1;
            rows.push(StoredEvent {
                stream_id,
                stream_name: stream_name.to_owned(),
                stream_version: version,
                event_id: pending.event_id,
                event_name: pending.event_name.to_owned(),
                event_data: self.registry.serialize(pending.event_name, pending.payload)?,
                occurred_at: pending.occurred_at,
            });
        }

        if rows.is_empty() {
            return Ok(());
        }

        self.events.append_events(&rows).await?;
        tracing::debug!(count = rows.len(), new_version = version, "appended events");
        Ok(())
    }
}

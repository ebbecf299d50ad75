//! Aggregate root abstraction.
//!
//! An aggregate is identified by `(id, AGGREGATE_NAME)`, carries the version
//! of the last persisted event it has applied, and buffers events raised by
//! domain operations until the repository saves them.

use std::any::Any;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::{Event, EventKind, EventMetadata};
use crate::registry::Payload;

/// Identity, version and pending-event buffer shared by every aggregate.
#[derive(Debug, Clone)]
pub struct AggregateBase<K> {
    id: Uuid,
    version: i64,
    uncommitted_events: Vec<Event<K>>,
}

impl<K: EventKind> AggregateBase<K> {
    /// Creates an empty shell at version 0.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            uncommitted_events: Vec::new(),
        }
    }

    /// Returns the aggregate identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Version of the last persisted event applied to this aggregate.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Version the stream will have once pending events are persisted.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn pending_version(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64
    }

    /// Events raised since the last save.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[Event<K>] {
        &self.uncommitted_events
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn next_event(&self, aggregate_name: &str, kind: K, occurred_at: DateTime<Utc>) -> Event<K> {
        Event {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_name: kind.event_name().to_owned(),
                aggregate_id: self.id,
                aggregate_name: aggregate_name.to_owned(),
                version: self.pending_version() + 1,
                occurred_at,
            },
            kind,
        }
    }

    fn commit(&mut self) {
        self.version = self.pending_version();
        self.uncommitted_events.clear();
    }
}

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized + 'static {
    /// The closed set of events this aggregate produces and consumes.
    type Event: EventKind;

    /// Compacted state written by the snapshot store.
    type Snapshot: Any + Send + Sync;

    /// Stream (aggregate type) name.
    const AGGREGATE_NAME: &'static str;

    /// Registry key of `Self::Snapshot`.
    const SNAPSHOT_NAME: &'static str;

    /// Creates an empty shell for `id` at version 0.
    fn new(id: Uuid) -> Self;

    /// Shared identity/version/buffer state.
    fn base(&self) -> &AggregateBase<Self::Event>;

    /// Mutable access to the shared state.
    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event>;

    /// State transition function.
    fn apply(&mut self, event: &Event<Self::Event>);

    /// Captures the full current state.
    fn to_snapshot(&self) -> Self::Snapshot;

    /// Replaces the current state with a checkpoint.
    fn apply_snapshot(&mut self, snapshot: Self::Snapshot);

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid {
        self.base().id()
    }

    /// Returns the persisted version.
    fn version(&self) -> i64 {
        self.base().version()
    }

    /// Returns the version after pending events are persisted.
    fn pending_version(&self) -> i64 {
        self.base().pending_version()
    }

    /// Returns events raised since the last save.
    fn uncommitted_events(&self) -> &[Event<Self::Event>] {
        self.base().uncommitted_events()
    }

    /// Applies `kind` to the in-memory state and buffers it for persistence.
    fn raise(&mut self, kind: Self::Event, clock: &dyn Clock) {
        let event = self
            .base()
            .next_event(Self::AGGREGATE_NAME, kind, clock.now());
        self.apply(&event);
        self.base_mut().uncommitted_events.push(event);
    }

    /// Marks buffered events as persisted: advances the version and clears
    /// the buffer.
    fn commit_events(&mut self) {
        self.base_mut().commit();
    }
}

/// A pending event as seen by a store: borrowed payload, no version yet.
#[derive(Debug)]
pub struct PendingEvent<'a> {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Registry key of the payload.
    pub event_name: &'static str,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
    /// The payload to encode.
    pub payload: &'a (dyn Any + Send + Sync),
}

/// An event read back from storage with its payload already decoded.
#[derive(Debug)]
pub struct RecordedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Registry key of the payload.
    pub event_name: String,
    /// Stream version of the event.
    pub version: i64,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
    /// Decoded payload.
    pub payload: Payload,
}

/// Object-safe view of an aggregate used by the store chain.
///
/// Implemented for every [`AggregateRoot`]; stores and decorators only ever
/// see `&mut dyn EventSourced`.
pub trait EventSourced: Send + Sync {
    /// Stream identifier.
    fn stream_id(&self) -> Uuid;

    /// Stream (aggregate type) name.
    fn stream_name(&self) -> &'static str;

    /// Version of the last persisted event applied.
    fn stream_version(&self) -> i64;

    /// Buffered events in raise order.
    fn pending_events(&self) -> Vec<PendingEvent<'_>>;

    /// Applies a stored event and advances the version to `event.version`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnexpectedPayload` if the event is not one of
    /// the aggregate's events.
    fn load_event(&mut self, event: RecordedEvent) -> Result<(), DomainError>;

    /// Registry key of the snapshot payload.
    fn snapshot_name(&self) -> &'static str;

    /// Captures the current state as a snapshot payload.
    fn snapshot_payload(&self) -> Payload;

    /// Installs a snapshot as the base state at `version`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnexpectedPayload` if the payload is not the
    /// aggregate's snapshot type.
    fn restore_snapshot(&mut self, name: &str, payload: Payload, version: i64)
    -> Result<(), DomainError>;
}

impl<A: AggregateRoot> EventSourced for A {
    fn stream_id(&self) -> Uuid {
        self.base().id()
    }

    fn stream_name(&self) -> &'static str {
        A::AGGREGATE_NAME
    }

    fn stream_version(&self) -> i64 {
        self.base().version()
    }

    fn pending_events(&self) -> Vec<PendingEvent<'_>> {
        self.base()
            .uncommitted_events()
            .iter()
            .map(|event| PendingEvent {
                event_id: event.metadata.event_id,
                event_name: event.kind.event_name(),
                occurred_at: event.metadata.occurred_at,
                payload: event.kind.payload(),
            })
            .collect()
    }

    fn load_event(&mut self, event: RecordedEvent) -> Result<(), DomainError> {
        let kind = A::Event::from_payload(A::AGGREGATE_NAME, &event.event_name, event.payload)?;
        let event = Event {
            metadata: EventMetadata {
                event_id: event.event_id,
                event_name: event.event_name,
                aggregate_id: self.base().id(),
                aggregate_name: A::AGGREGATE_NAME.to_owned(),
                version: event.version,
                occurred_at: event.occurred_at,
            },
            kind,
        };
        self.apply(&event);
        self.base_mut().set_version(event.metadata.version);
        Ok(())
    }

    fn snapshot_name(&self) -> &'static str {
        A::SNAPSHOT_NAME
    }

    fn snapshot_payload(&self) -> Payload {
        Box::new(self.to_snapshot())
    }

    fn restore_snapshot(
        &mut self,
        name: &str,
        payload: Payload,
        version: i64,
    ) -> Result<(), DomainError> {
        let snapshot = payload
            .downcast::<A::Snapshot>()
            .map_err(|_| DomainError::UnexpectedPayload {
                aggregate_name: A::AGGREGATE_NAME.to_owned(),
                payload_name: name.to_owned(),
            })?;
        self.apply_snapshot(*snapshot);
        self.base_mut().set_version(version);
        Ok(())
    }
}

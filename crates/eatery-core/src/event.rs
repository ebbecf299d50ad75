//! Domain event abstractions.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::registry::Payload;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Registry key of the payload.
    pub event_name: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name of the stream.
    pub aggregate_name: String,
    /// Position of the event within the stream, starting at 1.
    pub version: i64,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// The closed set of payloads an aggregate raises and applies.
///
/// Implemented by one enum per aggregate. The registry only sees the
/// variant's inner value; in-process dispatch goes through the enum.
pub trait EventKind: Clone + fmt::Debug + Send + Sync + 'static {
    /// Registry key of the current variant.
    fn event_name(&self) -> &'static str;

    /// The variant's inner value, handed to the registry for encoding.
    fn payload(&self) -> &(dyn Any + Send + Sync);

    /// Rebuilds the enum from a decoded payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnexpectedPayload` if `event_name` is not one of
    /// this aggregate's events or the payload has the wrong type.
    fn from_payload(aggregate_name: &str, event_name: &str, payload: Payload)
    -> Result<Self, DomainError>;
}

/// A domain event: metadata plus the aggregate-specific payload.
#[derive(Debug, Clone)]
pub struct Event<K> {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: K,
}

/// Anything the dispatcher can route by name.
pub trait NamedEvent: Send + Sync {
    /// The name handlers subscribe to.
    fn event_name(&self) -> &str;
}

impl<K: EventKind> NamedEvent for Event<K> {
    fn event_name(&self) -> &str {
        &self.metadata.event_name
    }
}

/// Downcasts a decoded payload to the variant type `T`.
///
/// Helper for `EventKind::from_payload` implementations.
///
/// # Errors
///
/// Returns `DomainError::UnexpectedPayload` if the payload is not a `T`.
pub fn downcast_payload<T: Any>(
    aggregate_name: &str,
    event_name: &str,
    payload: Payload,
) -> Result<T, DomainError> {
    payload
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| unexpected_payload(aggregate_name, event_name))
}

/// Builds the error returned for an event name an aggregate does not handle.
#[must_use]
pub fn unexpected_payload(aggregate_name: &str, event_name: &str) -> DomainError {
    DomainError::UnexpectedPayload {
        aggregate_name: aggregate_name.to_owned(),
        payload_name: event_name.to_owned(),
    }
}

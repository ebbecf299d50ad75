//! The load/save contract shared by the event store and its decorators.

use async_trait::async_trait;

use crate::aggregate::EventSourced;
use crate::error::DomainError;

/// A component that can rebuild an aggregate from storage and persist its
/// pending events.
///
/// Decorators (e.g. the snapshot store) hold an `Arc<dyn AggregateStore>`
/// and call through to it.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Brings `aggregate` up to date with everything persisted after its
    /// current version. Finding nothing is not an error.
    async fn load(&self, aggregate: &mut dyn EventSourced) -> Result<(), DomainError>;

    /// Persists the aggregate's pending events. Does not clear the buffer.
    async fn save(&self, aggregate: &mut dyn EventSourced) -> Result<(), DomainError>;
}

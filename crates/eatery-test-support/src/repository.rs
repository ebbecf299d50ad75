//! In-memory and failing implementations of the store traits.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use eatery_core::error::DomainError;
use eatery_core::event_store::{EventRepository, StoredEvent};
use eatery_core::message::{InboxStore, Message, OutboxStore, SaveOutcome};
use eatery_core::read_model::{ReadModelRepository, ReadModelRow};
use eatery_core::snapshot::{SnapshotRecord, SnapshotRepository};
use uuid::Uuid;

use crate::database::{Op, Scope, rows_of};

/// Event repository over an [`crate::InMemoryDatabase`] scope. Counts the
/// rows it hands out so tests can observe how much of a stream was replayed.
#[derive(Debug, Clone)]
pub struct InMemoryEventRepository {
    scope: Scope,
    rows_loaded: Arc<AtomicUsize>,
}

impl InMemoryEventRepository {
    pub(crate) fn new(scope: Scope) -> Self {
        Self {
            scope,
            rows_loaded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total number of rows returned by `load_events` so far.
    #[must_use]
    pub fn rows_loaded(&self) -> usize {
        self.rows_loaded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let mut rows: Vec<StoredEvent> = self.scope.read(|tables| {
            tables
                .events
                .iter()
                .filter(|e| {
                    e.stream_id == stream_id
                        && e.stream_name == stream_name
                        && e.stream_version > after_version
                })
                .cloned()
                .collect()
        });
        rows.sort_by_key(|e| e.stream_version);
        self.rows_loaded.fetch_add(rows.len(), Ordering::SeqCst);
        Ok(rows)
    }

    async fn append_events(&self, events: &[StoredEvent]) -> Result<(), DomainError> {
        for event in events {
            self.scope.write(Op::AppendEvent(event.clone()))?;
        }
        Ok(())
    }
}

/// Snapshot repository over an [`crate::InMemoryDatabase`] scope.
#[derive(Debug, Clone)]
pub struct InMemorySnapshotRepository {
    scope: Scope,
}

impl InMemorySnapshotRepository {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn load_latest(
        &self,
        stream_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<SnapshotRecord>, DomainError> {
        Ok(self.scope.read(|tables| {
            tables
                .snapshots
                .iter()
                .filter(|s| s.stream_id == stream_id && s.stream_name == stream_name)
                .max_by_key(|s| s.stream_version)
                .cloned()
        }))
    }

    async fn save(&self, record: &SnapshotRecord) -> Result<(), DomainError> {
        self.scope.write(Op::SaveSnapshot(record.clone()))?;
        Ok(())
    }
}

/// Outbox over an [`crate::InMemoryDatabase`] scope.
#[derive(Debug, Clone)]
pub struct InMemoryOutboxStore {
    scope: Scope,
}

impl InMemoryOutboxStore {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn save(&self, message: &Message) -> Result<SaveOutcome, DomainError> {
        self.scope.write(Op::SaveOutbox(message.clone()))
    }

    async fn find_unpublished(&self, limit: i64) -> Result<Vec<Message>, DomainError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.scope.read(|tables| {
            tables
                .outbox
                .iter()
                .filter(|m| m.sent_at.is_none())
                .take(limit)
                .cloned()
                .collect()
        }))
    }

    async fn mark_published(&self, ids: &[String]) -> Result<(), DomainError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.scope
            .write(Op::MarkPublished(ids.to_vec(), Utc::now()))?;
        Ok(())
    }
}

/// Inbox over an [`crate::InMemoryDatabase`] scope.
#[derive(Debug, Clone)]
pub struct InMemoryInboxStore {
    scope: Scope,
}

impl InMemoryInboxStore {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl InboxStore for InMemoryInboxStore {
    async fn save(&self, message: &Message) -> Result<SaveOutcome, DomainError> {
        self.scope.write(Op::SaveInbox(message.clone()))
    }
}

/// Read model over an [`crate::InMemoryDatabase`] scope. Rows written through
/// a transaction appear only once it commits.
#[derive(Clone)]
pub struct InMemoryReadModelRepository<R> {
    scope: Scope,
    rows: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for InMemoryReadModelRepository<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryReadModelRepository")
            .field("scope", &self.scope)
            .finish()
    }
}

impl<R> InMemoryReadModelRepository<R> {
    pub(crate) fn new(scope: Scope) -> Self {
        Self {
            scope,
            rows: PhantomData,
        }
    }
}

#[async_trait]
impl<R: ReadModelRow> ReadModelRepository<R> for InMemoryReadModelRepository<R> {
    async fn upsert(&self, row: &R) -> Result<(), DomainError> {
        self.scope
            .write(Op::UpsertRow((R::TABLE, row.row_id()), Arc::new(row.clone())))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<R>, DomainError> {
        Ok(self.scope.read(rows_of::<R>))
    }
}

/// An event repository that always returns a transient error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(
        &self,
        _stream_id: Uuid,
        _stream_name: &str,
        _after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Transient("connection refused".into()))
    }

    async fn append_events(&self, _events: &[StoredEvent]) -> Result<(), DomainError> {
        Err(DomainError::Transient("connection refused".into()))
    }
}

/// A snapshot repository that finds nothing and fails every write. Useful for
/// checking that snapshot failures never undo an event append.
#[derive(Debug)]
pub struct FailingSnapshotRepository;

#[async_trait]
impl SnapshotRepository for FailingSnapshotRepository {
    async fn load_latest(
        &self,
        _stream_id: Uuid,
        _stream_name: &str,
    ) -> Result<Option<SnapshotRecord>, DomainError> {
        Ok(None)
    }

    async fn save(&self, _record: &SnapshotRecord) -> Result<(), DomainError> {
        Err(DomainError::Transient("snapshot table unavailable".into()))
    }
}

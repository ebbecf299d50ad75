//! In-memory database shared by the in-memory stores.
//!
//! Stores created from [`InMemoryDatabase`] write straight to the committed
//! tables. Stores created from an [`InMemoryTransaction`] write to a private
//! view that reaches the committed tables only on [`InMemoryTransaction::commit`];
//! dropping the transaction discards the writes.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use eatery_core::error::DomainError;
use eatery_core::event_store::StoredEvent;
use eatery_core::message::{Message, SaveOutcome};
use eatery_core::read_model::ReadModelRow;
use eatery_core::snapshot::SnapshotRecord;
use uuid::Uuid;

use crate::repository::{
    InMemoryEventRepository, InMemoryInboxStore, InMemoryOutboxStore, InMemoryReadModelRepository,
    InMemorySnapshotRepository,
};

pub(crate) type RowKey = (&'static str, Uuid);
pub(crate) type Row = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    pub(crate) events: Vec<StoredEvent>,
    pub(crate) snapshots: Vec<SnapshotRecord>,
    pub(crate) outbox: Vec<Message>,
    pub(crate) inbox: Vec<Message>,
    pub(crate) read_models: BTreeMap<RowKey, Row>,
}

#[derive(Debug, Clone)]
pub(crate) enum Op {
    AppendEvent(StoredEvent),
    SaveSnapshot(SnapshotRecord),
    SaveOutbox(Message),
    MarkPublished(Vec<String>, DateTime<Utc>),
    SaveInbox(Message),
    UpsertRow(RowKey, Row),
}

impl Tables {
    fn apply(&mut self, op: &Op) -> Result<SaveOutcome, DomainError> {
        match op {
            Op::AppendEvent(row) => {
                let taken = self.events.iter().any(|e| {
                    e.stream_id == row.stream_id
                        && e.stream_name == row.stream_name
                        && e.stream_version == row.stream_version
                });
                if taken {
                    return Err(DomainError::Conflict {
                        stream_id: row.stream_id,
                        stream_name: row.stream_name.clone(),
                        version: row.stream_version,
                    });
                }
                self.events.push(row.clone());
            }
            Op::SaveSnapshot(record) => {
                let same_stream = |s: &SnapshotRecord| {
                    s.stream_id == record.stream_id && s.stream_name == record.stream_name
                };
                if self
                    .snapshots
                    .iter()
                    .any(|s| same_stream(s) && s.stream_version >= record.stream_version)
                {
                    return Ok(SaveOutcome::Stored);
                }
                self.snapshots.retain(|s| !same_stream(s));
                self.snapshots.push(record.clone());
            }
            Op::SaveOutbox(message) => {
                if self.outbox.iter().any(|m| m.id == message.id) {
                    return Ok(SaveOutcome::Duplicate);
                }
                self.outbox.push(message.clone());
            }
            Op::MarkPublished(ids, sent_at) => {
                for message in &mut self.outbox {
                    if message.sent_at.is_none() && ids.contains(&message.id) {
                        message.sent_at = Some(*sent_at);
                    }
                }
            }
            Op::SaveInbox(message) => {
                if self.inbox.iter().any(|m| m.id == message.id) {
                    return Ok(SaveOutcome::Duplicate);
                }
                self.inbox.push(message.clone());
            }
            Op::UpsertRow(key, row) => {
                self.read_models.insert(*key, Arc::clone(row));
            }
        }
        Ok(SaveOutcome::Stored)
    }
}

#[derive(Debug)]
pub(crate) struct TxState {
    view: Tables,
    ops: Vec<Op>,
    finished: bool,
}

/// Where a store reads from and writes to.
#[derive(Debug, Clone)]
pub(crate) enum Scope {
    AutoCommit(Arc<Mutex<Tables>>),
    Transaction(Arc<Mutex<TxState>>),
}

impl Scope {
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        match self {
            Self::AutoCommit(tables) => f(&tables.lock().unwrap()),
            Self::Transaction(state) => f(&state.lock().unwrap().view),
        }
    }

    pub(crate) fn write(&self, op: Op) -> Result<SaveOutcome, DomainError> {
        match self {
            Self::AutoCommit(tables) => tables.lock().unwrap().apply(&op),
            Self::Transaction(state) => {
                let mut state = state.lock().unwrap();
                if state.finished {
                    return Err(DomainError::Transient("transaction already finished".into()));
                }
                let outcome = state.view.apply(&op)?;
                if outcome == SaveOutcome::Stored {
                    state.ops.push(op);
                }
                Ok(outcome)
            }
        }
    }
}

/// A process-local stand-in for the PostgreSQL database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    committed: Arc<Mutex<Tables>>,
}

impl InMemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a transaction whose writes stay private until committed.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn begin(&self) -> InMemoryTransaction {
        let view = self.committed.lock().unwrap().clone();
        InMemoryTransaction {
            committed: Arc::clone(&self.committed),
            state: Arc::new(Mutex::new(TxState {
                view,
                ops: Vec::new(),
                finished: false,
            })),
        }
    }

    fn scope(&self) -> Scope {
        Scope::AutoCommit(Arc::clone(&self.committed))
    }

    /// Event repository writing directly to committed state.
    #[must_use]
    pub fn event_repository(&self) -> InMemoryEventRepository {
        InMemoryEventRepository::new(self.scope())
    }

    /// Snapshot repository writing directly to committed state.
    #[must_use]
    pub fn snapshot_repository(&self) -> InMemorySnapshotRepository {
        InMemorySnapshotRepository::new(self.scope())
    }

    /// Outbox writing directly to committed state.
    #[must_use]
    pub fn outbox(&self) -> InMemoryOutboxStore {
        InMemoryOutboxStore::new(self.scope())
    }

    /// Inbox writing directly to committed state.
    #[must_use]
    pub fn inbox(&self) -> InMemoryInboxStore {
        InMemoryInboxStore::new(self.scope())
    }

    /// Read model repository writing directly to committed state.
    #[must_use]
    pub fn read_model<R: ReadModelRow>(&self) -> InMemoryReadModelRepository<R> {
        InMemoryReadModelRepository::new(self.scope())
    }

    /// Committed rows of read model `R` in listing order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn read_model_rows<R: ReadModelRow>(&self) -> Vec<R> {
        rows_of(&self.committed.lock().unwrap())
    }

    /// Committed event rows in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<StoredEvent> {
        self.committed.lock().unwrap().events.clone()
    }

    /// Committed snapshot rows.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.committed.lock().unwrap().snapshots.clone()
    }

    /// Committed outbox rows in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn outbox_messages(&self) -> Vec<Message> {
        self.committed.lock().unwrap().outbox.clone()
    }

    /// Committed inbox rows in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn inbox_messages(&self) -> Vec<Message> {
        self.committed.lock().unwrap().inbox.clone()
    }
}

pub(crate) fn rows_of<R: ReadModelRow>(tables: &Tables) -> Vec<R> {
    let mut rows: Vec<R> = tables
        .read_models
        .iter()
        .filter(|((table, _), _)| *table == R::TABLE)
        .filter_map(|(_, row)| row.downcast_ref::<R>().cloned())
        .collect();
    rows.sort_by(R::listing_order);
    rows
}

/// An open in-memory transaction. Cloning shares the same transaction.
#[derive(Debug, Clone)]
pub struct InMemoryTransaction {
    committed: Arc<Mutex<Tables>>,
    state: Arc<Mutex<TxState>>,
}

impl InMemoryTransaction {
    fn scope(&self) -> Scope {
        Scope::Transaction(Arc::clone(&self.state))
    }

    /// Event repository bound to this transaction.
    #[must_use]
    pub fn event_repository(&self) -> InMemoryEventRepository {
        InMemoryEventRepository::new(self.scope())
    }

    /// Snapshot repository bound to this transaction.
    #[must_use]
    pub fn snapshot_repository(&self) -> InMemorySnapshotRepository {
        InMemorySnapshotRepository::new(self.scope())
    }

    /// Outbox bound to this transaction.
    #[must_use]
    pub fn outbox(&self) -> InMemoryOutboxStore {
        InMemoryOutboxStore::new(self.scope())
    }

    /// Inbox bound to this transaction.
    #[must_use]
    pub fn inbox(&self) -> InMemoryInboxStore {
        InMemoryInboxStore::new(self.scope())
    }

    /// Read model repository bound to this transaction.
    #[must_use]
    pub fn read_model<R: ReadModelRow>(&self) -> InMemoryReadModelRepository<R> {
        InMemoryReadModelRepository::new(self.scope())
    }

    /// Replays this transaction's writes onto the committed tables. Either
    /// every write lands or none does.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Conflict` if another writer committed an event
    /// version this transaction also wrote, or `DomainError::Transient` if the
    /// transaction was already finished.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub fn commit(self) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        if state.finished {
            return Err(DomainError::Transient("transaction already finished".into()));
        }
        state.finished = true;

        let mut committed = self.committed.lock().unwrap();
        let mut next = committed.clone();
        for op in &state.ops {
            next.apply(op)?;
        }
        *committed = next;
        Ok(())
    }

    /// Discards this transaction's writes.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn rollback(self) {
        let mut state = self.state.lock().unwrap();
        state.finished = true;
        state.ops.clear();
    }
}

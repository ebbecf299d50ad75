//! Integration messages and the stores/brokers that carry them.
//!
//! The outbox holds messages written in the same transaction as the state
//! change that produced them until a processor publishes them; the inbox
//! records consumed message ids so redelivery can be detected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// Free-form message metadata (correlation ids, content type, ...).
pub type Metadata = Map<String, Value>;

/// An outgoing or incoming integration message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Globally unique message id; the deduplication key.
    pub id: String,
    /// Registry key of the payload.
    pub name: String,
    /// Topic (channel) the message is published to.
    pub subject: String,
    /// Encoded payload.
    pub data: Vec<u8>,
    /// Message metadata.
    pub metadata: Metadata,
    /// When the outbox processor confirmed the publish; `None` until then.
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates an unsent message with empty metadata.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        subject: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subject: subject.into(),
            data,
            metadata: Metadata::new(),
            sent_at: None,
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of an idempotent save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new row was written.
    Stored,
    /// A row with the same id already existed; nothing was written.
    Duplicate,
}

impl SaveOutcome {
    /// Whether the message had been seen before.
    #[must_use]
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Durable store of outgoing messages.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts `message` in the current transaction. An existing id yields
    /// `SaveOutcome::Duplicate`.
    async fn save(&self, message: &Message) -> Result<SaveOutcome, DomainError>;

    /// Returns up to `limit` unsent messages, oldest first.
    async fn find_unpublished(&self, limit: i64) -> Result<Vec<Message>, DomainError>;

    /// Marks `ids` as sent. Ids that are already marked are left untouched.
    async fn mark_published(&self, ids: &[String]) -> Result<(), DomainError>;
}

/// Record of consumed messages.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Inserts `message`. An existing id yields `SaveOutcome::Duplicate`,
    /// meaning the message was already handled.
    async fn save(&self, message: &Message) -> Result<SaveOutcome, DomainError>;
}

/// Anything that accepts a message for a topic: a broker, or the outbox.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes `message` on `topic`.
    async fn publish(&self, topic: &str, message: &Message) -> Result<(), DomainError>;
}

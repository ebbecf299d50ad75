//! Publishers that sit between domain code and the broker.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::message::{Message, MessagePublisher, Metadata, OutboxStore};
use eatery_core::registry::Registry;
use tracing::instrument;

/// A [`MessagePublisher`] that writes to the outbox instead of the broker.
///
/// Bind it to the unit of work's transaction so the message commits (or rolls
/// back) with the state change that produced it. Republishing a message id
/// that is already in the outbox is a no-op.
#[derive(Clone)]
pub struct OutboxPublisher {
    outbox: Arc<dyn OutboxStore>,
}

impl OutboxPublisher {
    /// Creates a new `OutboxPublisher`.
    #[must_use]
    pub fn new(outbox: Arc<dyn OutboxStore>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl MessagePublisher for OutboxPublisher {
    #[instrument(skip_all, fields(topic = %topic, message_id = %message.id), err)]
    async fn publish(&self, topic: &str, message: &Message) -> Result<(), DomainError> {
        let mut message = message.clone();
        message.subject = topic.to_owned();
        message.sent_at = None;

        let outcome = self.outbox.save(&message).await?;
        if outcome.is_duplicate() {
            tracing::debug!("message already in outbox");
        }
        Ok(())
    }
}

/// Serializes integration events through the registry and hands them to a
/// [`MessagePublisher`].
#[derive(Clone)]
pub struct EventPublisher {
    registry: Arc<Registry>,
    publisher: Arc<dyn MessagePublisher>,
}

impl EventPublisher {
    /// Creates a new `EventPublisher`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Encodes `payload` under `name` and publishes it on `topic`.
    ///
    /// `message_id` is the deduplication key downstream; deriving it from the
    /// domain event that caused the publish makes retries idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if `name` is not registered for
    /// the payload type, or whatever the underlying publisher reports.
    #[instrument(skip(self, payload, metadata), err)]
    pub async fn publish<T: Any + Send + Sync>(
        &self,
        message_id: &str,
        topic: &str,
        name: &str,
        payload: &T,
        metadata: Metadata,
    ) -> Result<Message, DomainError> {
        let data = self.registry.serialize(name, payload)?;
        let message = Message {
            id: message_id.to_owned(),
            name: name.to_owned(),
            subject: topic.to_owned(),
            data,
            metadata,
            sent_at: None,
        };
        self.publisher.publish(topic, &message).await?;
        Ok(message)
    }
}

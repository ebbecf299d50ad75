//! Inbound message handling with inbox deduplication.

use std::sync::Arc;

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::message::{InboxStore, Message};
use tracing::instrument;

/// Reacts to an integration message received from the broker.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles `message`.
    async fn handle(&self, message: &Message) -> Result<(), DomainError>;
}

/// Outcome of [`InboxHandler::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// First delivery; the wrapped handler ran.
    Processed,
    /// Redelivery of a message already recorded in the inbox; the wrapped
    /// handler was skipped. Acknowledge it to the broker.
    AlreadyProcessed,
}

/// Records each message in the inbox before running the wrapped handler, so
/// a redelivered message is acknowledged without being handled twice.
///
/// Bind the inbox and the handler's stores to the same transaction: if the
/// handler fails, the inbox row rolls back with it and the message is handled
/// again on redelivery.
#[derive(Clone)]
pub struct InboxHandler {
    inbox: Arc<dyn InboxStore>,
    handler: Arc<dyn MessageHandler>,
}

impl InboxHandler {
    /// Creates a new `InboxHandler`.
    #[must_use]
    pub fn new(inbox: Arc<dyn InboxStore>, handler: Arc<dyn MessageHandler>) -> Self {
        Self { inbox, handler }
    }

    /// Deduplicates and handles `message`.
    ///
    /// # Errors
    ///
    /// Returns the inbox or handler error. A duplicate is not an error.
    #[instrument(skip_all, fields(message_id = %message.id, name = %message.name), err)]
    pub async fn handle(&self, message: &Message) -> Result<Handled, DomainError> {
        if self.inbox.save(message).await?.is_duplicate() {
            tracing::debug!("skipping already processed message");
            return Ok(Handled::AlreadyProcessed);
        }
        self.handler.handle(message).await?;
        Ok(Handled::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use eatery_test_support::InMemoryDatabase;

    use super::*;

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: &Message) -> Result<(), DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RejectingHandler;

    #[async_trait]
    impl MessageHandler for RejectingHandler {
        async fn handle(&self, _message: &Message) -> Result<(), DomainError> {
            Err(DomainError::Transient("downstream unavailable".into()))
        }
    }

    fn message() -> Message {
        Message::new("m-1", "testapi.Opened", "test.topic", b"{}".to_vec())
    }

    #[tokio::test]
    async fn test_redelivered_message_is_handled_once() {
        // Arrange
        let db = InMemoryDatabase::new();
        let counter = Arc::new(CountingHandler::default());
        let handler = InboxHandler::new(Arc::new(db.inbox()), counter.clone());

        // Act
        let first = handler.handle(&message()).await.unwrap();
        let second = handler.handle(&message()).await.unwrap();

        // Assert
        assert_eq!(first, Handled::Processed);
        assert_eq!(second, Handled::AlreadyProcessed);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.inbox_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_handling_in_rolled_back_transaction_allows_retry() {
        // Arrange
        let db = InMemoryDatabase::new();
        let tx = db.begin();
        let failing = InboxHandler::new(Arc::new(tx.inbox()), Arc::new(RejectingHandler));
        assert!(failing.handle(&message()).await.is_err());
        drop(failing);
        drop(tx);

        let counter = Arc::new(CountingHandler::default());
        let retry = InboxHandler::new(Arc::new(db.inbox()), counter.clone());

        // Act
        let outcome = retry.handle(&message()).await.unwrap();

        // Assert
        assert_eq!(outcome, Handled::Processed);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }
}

//! Test brokers: `MessagePublisher` implementations that record or fail.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::message::{Message, MessagePublisher};

/// A broker that records every publish. Messages whose id is in the failing
/// set are rejected with a transient error and not recorded.
#[derive(Debug, Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<(String, Message)>>,
    failing_ids: Mutex<HashSet<String>>,
    attempts: Mutex<usize>,
}

impl RecordingBroker {
    /// Creates a broker that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that rejects the given message ids.
    #[must_use]
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            failing_ids: Mutex::new(ids.iter().map(|id| (*id).to_owned()).collect()),
            ..Self::default()
        }
    }

    /// Stops rejecting any message.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn heal(&self) {
        self.failing_ids.lock().unwrap().clear();
    }

    /// Returns `(topic, message)` pairs in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<(String, Message)> {
        self.published.lock().unwrap().clone()
    }

    /// Ids of the published messages in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published_ids(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.id.clone())
            .collect()
    }

    /// Number of publish calls, successful or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl MessagePublisher for RecordingBroker {
    async fn publish(&self, topic: &str, message: &Message) -> Result<(), DomainError> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing_ids.lock().unwrap().contains(&message.id) {
            return Err(DomainError::Transient(format!(
                "broker rejected message {}",
                message.id
            )));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_owned(), message.clone()));
        Ok(())
    }
}

/// A broker that is never reachable.
#[derive(Debug)]
pub struct FailingBroker;

#[async_trait]
impl MessagePublisher for FailingBroker {
    async fn publish(&self, _topic: &str, _message: &Message) -> Result<(), DomainError> {
        Err(DomainError::Transient("broker unreachable".into()))
    }
}

//! In-process domain event dispatcher.
//!
//! Handlers subscribe to event names; `publish` walks the events in order and
//! invokes each subscribed handler in registration order. The first handler
//! error aborts the publish and is returned. Handlers that already ran are
//! not compensated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::NamedEvent;

/// Reacts to a domain event inside the caller's unit of work.
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    /// Handles a single event.
    async fn handle(&self, event: &E) -> Result<(), DomainError>;
}

/// Synchronous name-keyed fan-out of domain events.
pub struct EventDispatcher<E> {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler<E>>>>,
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<E> fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut subscriptions: Vec<(&str, usize)> = self
            .handlers
            .iter()
            .map(|(name, handlers)| (name.as_str(), handlers.len()))
            .collect();
        subscriptions.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &subscriptions)
            .finish()
    }
}

impl<E: NamedEvent> EventDispatcher<E> {
    /// Creates a dispatcher with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to every name in `event_names`.
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler<E>>, event_names: &[&str]) {
        for name in event_names {
            self.handlers
                .entry((*name).to_owned())
                .or_default()
                .push(Arc::clone(&handler));
        }
    }

    /// Number of handlers subscribed to `event_name`.
    #[must_use]
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers.get(event_name).map_or(0, Vec::len)
    }

    /// Dispatches `events` in order.
    ///
    /// # Errors
    ///
    /// Returns the first handler error; no further handlers run.
    pub async fn publish(&self, events: &[E]) -> Result<(), DomainError> {
        for event in events {
            let Some(handlers) = self.handlers.get(event.event_name()) else {
                continue;
            };
            for handler in handlers {
                handler.handle(event).await?;
            }
        }
        Ok(())
    }
}

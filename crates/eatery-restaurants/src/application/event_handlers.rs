//! Domain event handlers for the Restaurants context.
//!
//! Both handlers run inside the unit of work that raised the event, so their
//! writes commit or roll back with the event append.

use std::sync::Arc;

use async_trait::async_trait;
use eatery_core::dispatcher::EventHandler;
use eatery_core::error::DomainError;
use eatery_core::message::Metadata;
use eatery_messaging::publisher::EventPublisher;
use serde_json::Value;

use crate::domain::events::{RestaurantDomainEvent, RestaurantEvent};
use crate::integration;
use crate::read_model::{MallRepository, MallRestaurant};

/// Mirrors restaurant domain events as integration events on
/// [`integration::CHANNEL`].
///
/// The message id is the domain event id, so replaying a unit of work cannot
/// publish the same change twice.
#[derive(Clone)]
pub struct IntegrationEventHandler {
    publisher: EventPublisher,
}

impl IntegrationEventHandler {
    /// Creates a new `IntegrationEventHandler`.
    #[must_use]
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }
}

fn metadata(event: &RestaurantDomainEvent) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(
        "aggregate_version".to_owned(),
        Value::from(event.metadata.version),
    );
    metadata.insert(
        "occurred_at".to_owned(),
        Value::from(event.metadata.occurred_at.to_rfc3339()),
    );
    metadata
}

#[async_trait]
impl EventHandler<RestaurantDomainEvent> for IntegrationEventHandler {
    async fn handle(&self, event: &RestaurantDomainEvent) -> Result<(), DomainError> {
        let message_id = event.metadata.event_id.to_string();
        let restaurant_id = event.metadata.aggregate_id;
        match &event.kind {
            RestaurantEvent::Registered(e) => {
                let payload = integration::RestaurantRegistered {
                    restaurant_id,
                    name: e.name.clone(),
                };
                self.publisher
                    .publish(
                        &message_id,
                        integration::CHANNEL,
                        integration::REGISTERED,
                        &payload,
                        metadata(event),
                    )
                    .await?;
            }
            RestaurantEvent::Renamed(e) => {
                let payload = integration::RestaurantRenamed {
                    restaurant_id,
                    name: e.name.clone(),
                };
                self.publisher
                    .publish(
                        &message_id,
                        integration::CHANNEL,
                        integration::RENAMED,
                        &payload,
                        metadata(event),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

/// Keeps the mall read model in step with restaurant names.
#[derive(Clone)]
pub struct MallProjection {
    mall: Arc<MallRepository>,
}

impl MallProjection {
    /// Creates a new `MallProjection`.
    #[must_use]
    pub fn new(mall: Arc<MallRepository>) -> Self {
        Self { mall }
    }
}

#[async_trait]
impl EventHandler<RestaurantDomainEvent> for MallProjection {
    async fn handle(&self, event: &RestaurantDomainEvent) -> Result<(), DomainError> {
        let name = match &event.kind {
            RestaurantEvent::Registered(e) => &e.name,
            RestaurantEvent::Renamed(e) => &e.name,
        };
        self.mall
            .upsert(&MallRestaurant {
                id: event.metadata.aggregate_id,
                name: name.clone(),
                updated_at: event.metadata.occurred_at,
            })
            .await
    }
}

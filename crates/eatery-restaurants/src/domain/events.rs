//! Domain events for the Restaurants context.

use std::any::Any;

use eatery_core::error::DomainError;
use eatery_core::event::{Event, EventKind, downcast_payload, unexpected_payload};
use eatery_core::registry::Payload;
use serde::{Deserialize, Serialize};

/// Registry key of [`RestaurantRegistered`].
pub const REGISTERED: &str = "restaurants.RestaurantRegistered";
/// Registry key of [`RestaurantRenamed`].
pub const RENAMED: &str = "restaurants.RestaurantRenamed";

/// A restaurant was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRegistered {
    /// The name it was registered under.
    pub name: String,
}

/// A restaurant changed its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRenamed {
    /// The new name.
    pub name: String,
}

/// Events raised by the `Restaurant` aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestaurantEvent {
    /// See [`RestaurantRegistered`].
    Registered(RestaurantRegistered),
    /// See [`RestaurantRenamed`].
    Renamed(RestaurantRenamed),
}

/// A restaurant domain event with its metadata.
pub type RestaurantDomainEvent = Event<RestaurantEvent>;

impl EventKind for RestaurantEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Registered(_) => REGISTERED,
            Self::Renamed(_) => RENAMED,
        }
    }

    fn payload(&self) -> &(dyn Any + Send + Sync) {
        match self {
            Self::Registered(p) => p,
            Self::Renamed(p) => p,
        }
    }

    fn from_payload(
        aggregate_name: &str,
        event_name: &str,
        payload: Payload,
    ) -> Result<Self, DomainError> {
        match event_name {
            REGISTERED => {
                downcast_payload(aggregate_name, event_name, payload).map(Self::Registered)
            }
            RENAMED => downcast_payload(aggregate_name, event_name, payload).map(Self::Renamed),
            _ => Err(unexpected_payload(aggregate_name, event_name)),
        }
    }
}

//! Integration event contract published by the Restaurants context.
//!
//! These payloads cross the service boundary, so their names and shapes are
//! versioned independently from the domain events they are derived from.

use eatery_core::registry::RegistryBuilder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker channel carrying restaurant integration events.
pub const CHANNEL: &str = "eatery.restaurants.events.Restaurant";
/// Registry key of [`RestaurantRegistered`].
pub const REGISTERED: &str = "restaurantsapi.RestaurantRegistered";
/// Registry key of [`RestaurantRenamed`].
pub const RENAMED: &str = "restaurantsapi.RestaurantRenamed";

/// Published when a restaurant is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRegistered {
    /// The restaurant identifier.
    pub restaurant_id: Uuid,
    /// Display name.
    pub name: String,
}

/// Published when a restaurant is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRenamed {
    /// The restaurant identifier.
    pub restaurant_id: Uuid,
    /// The new display name.
    pub name: String,
}

/// Registers the integration payloads.
#[must_use]
pub fn register_types(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register_json::<RestaurantRegistered>(REGISTERED)
        .register_json::<RestaurantRenamed>(RENAMED)
}

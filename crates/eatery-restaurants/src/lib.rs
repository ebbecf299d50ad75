//! Restaurants bounded context.
//!
//! Owns the `Restaurant` aggregate, publishes its integration events through
//! the outbox and keeps the mall read model current.

pub mod application;
pub mod domain;
pub mod integration;
pub mod read_model;

use eatery_core::registry::RegistryBuilder;
use eatery_event_store::schema::Schema;

use crate::domain::aggregates::RestaurantV1;
use crate::domain::events::{REGISTERED, RENAMED, RestaurantRegistered, RestaurantRenamed};

/// PostgreSQL schema owned by this context.
pub const SCHEMA: Schema = Schema::new("restaurants");

/// Registers every payload this context persists or publishes: domain events,
/// the aggregate snapshot and the integration events.
#[must_use]
pub fn register_types(builder: RegistryBuilder) -> RegistryBuilder {
    let builder = builder
        .register_json::<RestaurantRegistered>(REGISTERED)
        .register_json::<RestaurantRenamed>(RENAMED)
        .register_json::<RestaurantV1>(domain::aggregates::SNAPSHOT_NAME);
    integration::register_types(builder)
}

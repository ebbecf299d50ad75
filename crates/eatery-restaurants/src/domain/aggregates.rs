//! Aggregate roots for the Restaurants context.

use eatery_core::aggregate::{AggregateBase, AggregateRoot};
use eatery_core::clock::Clock;
use eatery_core::error::DomainError;
use eatery_core::event::Event;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{RestaurantEvent, RestaurantRegistered, RestaurantRenamed};

/// Stream name of restaurant event streams.
pub const AGGREGATE_NAME: &str = "restaurants.Restaurant";
/// Registry key of [`RestaurantV1`].
pub const SNAPSHOT_NAME: &str = "restaurants.RestaurantV1";

/// Snapshot payload of a [`Restaurant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantV1 {
    /// Current display name.
    pub name: String,
}

/// The aggregate root for a restaurant.
#[derive(Debug)]
pub struct Restaurant {
    base: AggregateBase<RestaurantEvent>,
    /// Current display name; `None` until registered.
    pub(crate) name: Option<String>,
}

impl Restaurant {
    /// The current display name, if registered.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the restaurant exists, counting events not yet saved.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.pending_version() > 0
    }

    /// Registers the restaurant under `name`, producing a
    /// `RestaurantRegistered` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the restaurant already exists or
    /// the name is blank.
    pub fn register(&mut self, name: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.is_registered() {
            return Err(DomainError::Validation(format!(
                "restaurant {} is already registered",
                self.aggregate_id()
            )));
        }
        let name = validated_name(name)?;
        self.raise(
            RestaurantEvent::Registered(RestaurantRegistered { name }),
            clock,
        );
        Ok(())
    }

    /// Renames the restaurant, producing a `RestaurantRenamed` event. Renaming
    /// to the current name raises nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the restaurant was never registered
    /// and `DomainError::Validation` if the name is blank.
    pub fn rename(&mut self, name: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.is_registered() {
            return Err(DomainError::NotFound {
                aggregate_name: AGGREGATE_NAME.to_owned(),
                aggregate_id: self.aggregate_id(),
            });
        }
        let name = validated_name(name)?;
        if self.name.as_deref() == Some(name.as_str()) {
            return Ok(());
        }
        self.raise(RestaurantEvent::Renamed(RestaurantRenamed { name }), clock);
        Ok(())
    }
}

fn validated_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation(
            "restaurant name must not be blank".into(),
        ));
    }
    Ok(name.to_owned())
}

impl AggregateRoot for Restaurant {
    type Event = RestaurantEvent;
    type Snapshot = RestaurantV1;
    const AGGREGATE_NAME: &'static str = AGGREGATE_NAME;
    const SNAPSHOT_NAME: &'static str = SNAPSHOT_NAME;

    fn new(id: Uuid) -> Self {
        Self {
            base: AggregateBase::new(id),
            name: None,
        }
    }

    fn base(&self) -> &AggregateBase<RestaurantEvent> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<RestaurantEvent> {
        &mut self.base
    }

    fn apply(&mut self, event: &Event<RestaurantEvent>) {
        match &event.kind {
            RestaurantEvent::Registered(e) => self.name = Some(e.name.clone()),
            RestaurantEvent::Renamed(e) => self.name = Some(e.name.clone()),
        }
    }

    fn to_snapshot(&self) -> RestaurantV1 {
        RestaurantV1 {
            name: self.name.clone().unwrap_or_default(),
        }
    }

    fn apply_snapshot(&mut self, snapshot: RestaurantV1) {
        self.name = Some(snapshot.name);
    }
}

#[cfg(test)]
mod tests {
    use eatery_core::aggregate::EventSourced;
    use eatery_test_support::FixedClock;

    use super::*;
    use crate::domain::events::{REGISTERED, RENAMED};

    #[test]
    fn test_register_raises_event_with_trimmed_name() {
        // Arrange
        let id = Uuid::new_v4();
        let mut restaurant = Restaurant::new(id);
        let clock = FixedClock::default();

        // Act
        restaurant.register("  Chez Nous ", &clock).unwrap();

        // Assert
        let events = restaurant.uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.event_name, REGISTERED);
        assert_eq!(events[0].metadata.aggregate_id, id);
        assert_eq!(events[0].metadata.version, 1);
        assert_eq!(events[0].metadata.occurred_at, clock.0);
        assert_eq!(restaurant.name(), Some("Chez Nous"));
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let mut restaurant = Restaurant::new(Uuid::new_v4());
        restaurant.register("Chez Nous", &FixedClock::default()).unwrap();

        let result = restaurant.register("Chez Vous", &FixedClock::default());

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(restaurant.uncommitted_events().len(), 1);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let mut restaurant = Restaurant::new(Uuid::new_v4());

        let result = restaurant.register("   ", &FixedClock::default());

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(restaurant.uncommitted_events().is_empty());
    }

    #[test]
    fn test_rename_of_unregistered_restaurant_is_not_found() {
        let mut restaurant = Restaurant::new(Uuid::new_v4());

        let result = restaurant.rename("Chez Nous", &FixedClock::default());

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[test]
    fn test_rename_to_current_name_raises_nothing() {
        // Arrange
        let mut restaurant = Restaurant::new(Uuid::new_v4());
        let clock = FixedClock::default();
        restaurant.register("Chez Nous", &clock).unwrap();

        // Act
        restaurant.rename("Chez Nous", &clock).unwrap();
        restaurant.rename("Chez Vous", &clock).unwrap();

        // Assert
        let names: Vec<&str> = restaurant
            .uncommitted_events()
            .iter()
            .map(|e| e.metadata.event_name.as_str())
            .collect();
        assert_eq!(names, vec![REGISTERED, RENAMED]);
        assert_eq!(restaurant.name(), Some("Chez Vous"));
    }

    #[test]
    fn test_snapshot_restores_name() {
        let mut restaurant = Restaurant::new(Uuid::new_v4());

        restaurant
            .restore_snapshot(
                SNAPSHOT_NAME,
                Box::new(RestaurantV1 {
                    name: "Chez Nous".to_owned(),
                }),
                7,
            )
            .unwrap();

        assert_eq!(restaurant.name(), Some("Chez Nous"));
        assert_eq!(restaurant.version(), 7);
        assert!(restaurant.is_registered());
    }
}

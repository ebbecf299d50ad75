//! Command handlers for the Restaurants context.
//!
//! Each handler loads the aggregate, executes the command, fans the new
//! events out to the domain handlers and saves, all through one
//! [`UnitOfWork`]. The caller owns the transaction around it.

use eatery_core::aggregate::AggregateRoot;
use eatery_core::clock::Clock;
use eatery_core::command::Command;
use eatery_core::error::DomainError;
use tracing::instrument;

use super::unit_of_work::UnitOfWork;
use crate::domain::aggregates::Restaurant;
use crate::domain::commands::{RegisterRestaurant, RenameRestaurant};
use crate::domain::events::RestaurantDomainEvent;

/// Dispatches the pending events, then saves. A snapshot failure is logged
/// and does not fail the command: the events are already appended.
async fn persist(
    restaurant: &mut Restaurant,
    uow: &UnitOfWork,
) -> Result<Vec<RestaurantDomainEvent>, DomainError> {
    let events = restaurant.uncommitted_events().to_vec();
    if events.is_empty() {
        return Ok(events);
    }

    uow.dispatcher().publish(&events).await?;
    match uow.repository().save(restaurant).await {
        Ok(()) => {}
        Err(e) if e.is_warning() => tracing::warn!(error = %e, "snapshot not written"),
        Err(e) => return Err(e),
    }
    Ok(events)
}

/// Handles the `RegisterRestaurant` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the restaurant already exists or the
/// name is blank, `DomainError::Conflict` if another writer got there first,
/// or any store error.
#[instrument(
    skip_all,
    fields(command = command.command_name(), restaurant_id = %command.aggregate_id()),
    err
)]
pub async fn handle_register_restaurant(
    command: &RegisterRestaurant,
    clock: &dyn Clock,
    uow: &UnitOfWork,
) -> Result<Vec<RestaurantDomainEvent>, DomainError> {
    let mut restaurant = uow.repository().load(command.restaurant_id).await?;
    restaurant.register(&command.name, clock)?;
    persist(&mut restaurant, uow).await
}

/// Handles the `RenameRestaurant` command. Renaming to the current name
/// succeeds without producing events.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the restaurant does not exist,
/// `DomainError::Validation` if the name is blank, `DomainError::Conflict`
/// on a concurrent write, or any store error.
#[instrument(
    skip_all,
    fields(command = command.command_name(), restaurant_id = %command.aggregate_id()),
    err
)]
pub async fn handle_rename_restaurant(
    command: &RenameRestaurant,
    clock: &dyn Clock,
    uow: &UnitOfWork,
) -> Result<Vec<RestaurantDomainEvent>, DomainError> {
    let mut restaurant = uow.repository().load(command.restaurant_id).await?;
    restaurant.rename(&command.name, clock)?;
    persist(&mut restaurant, uow).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eatery_core::message::Message;
    use eatery_core::registry::{Registry, RegistryBuilder};
    use eatery_core::snapshot::SnapshotCadence;
    use eatery_test_support::{
        FailingSnapshotRepository, FixedClock, InMemoryDatabase, InMemoryTransaction,
    };
    use uuid::Uuid;

    use super::*;
    use crate::application::unit_of_work::RestaurantStores;
    use crate::domain::events::{REGISTERED, RENAMED};
    use crate::integration;
    use crate::read_model::MallRestaurant;
    use crate::register_types;

    fn registry() -> Arc<Registry> {
        Arc::new(register_types(RegistryBuilder::new()).build().unwrap())
    }

    fn stores(tx: &InMemoryTransaction) -> RestaurantStores {
        RestaurantStores {
            events: Arc::new(tx.event_repository()),
            snapshots: Arc::new(tx.snapshot_repository()),
            outbox: Arc::new(tx.outbox()),
            mall: Arc::new(tx.read_model::<MallRestaurant>()),
        }
    }

    fn unit_of_work(tx: &InMemoryTransaction) -> UnitOfWork {
        UnitOfWork::new(stores(tx), registry(), SnapshotCadence::every(3))
    }

    fn register(id: Uuid, name: &str) -> RegisterRestaurant {
        RegisterRestaurant {
            restaurant_id: id,
            name: name.to_owned(),
        }
    }

    fn rename(id: Uuid, name: &str) -> RenameRestaurant {
        RenameRestaurant {
            restaurant_id: id,
            name: name.to_owned(),
        }
    }

    async fn registered(db: &InMemoryDatabase, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let tx = db.begin();
        handle_register_restaurant(&register(id, name), &FixedClock::default(), &unit_of_work(&tx))
            .await
            .unwrap();
        tx.commit().unwrap();
        id
    }

    fn message_names(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_register_commits_event_and_integration_message_together() {
        // Arrange
        let db = InMemoryDatabase::new();
        let id = Uuid::new_v4();
        let tx = db.begin();

        // Act
        let events = handle_register_restaurant(
            &register(id, "Chez Nous"),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await
        .unwrap();
        tx.commit().unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.event_name, REGISTERED);
        assert_eq!(db.events().len(), 1);

        let outbox = db.outbox_messages();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].id, events[0].metadata.event_id.to_string());
        assert_eq!(outbox[0].name, integration::REGISTERED);
        assert_eq!(outbox[0].subject, integration::CHANNEL);
        assert!(outbox[0].sent_at.is_none());
        let payload: integration::RestaurantRegistered = registry()
            .deserialize_as(integration::REGISTERED, &outbox[0].data)
            .unwrap();
        assert_eq!(payload.restaurant_id, id);
        assert_eq!(payload.name, "Chez Nous");

        let listed = db.read_model_rows::<MallRestaurant>();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn test_register_existing_restaurant_is_rejected() {
        // Arrange
        let db = InMemoryDatabase::new();
        let id = registered(&db, "Chez Nous").await;
        let tx = db.begin();

        // Act
        let result = handle_register_restaurant(
            &register(id, "Chez Vous"),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(db.events().len(), 1);
    }

    #[tokio::test]
    async fn test_register_with_blank_name_writes_nothing() {
        let db = InMemoryDatabase::new();
        let tx = db.begin();

        let result = handle_register_restaurant(
            &register(Uuid::new_v4(), " "),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await;
        tx.commit().unwrap();

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(db.events().is_empty());
        assert!(db.outbox_messages().is_empty());
        assert!(db.read_model_rows::<MallRestaurant>().is_empty());
    }

    #[tokio::test]
    async fn test_rename_unknown_restaurant_is_not_found() {
        let db = InMemoryDatabase::new();
        let tx = db.begin();

        let result = handle_rename_restaurant(
            &rename(Uuid::new_v4(), "Chez Nous"),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rename_publishes_message_and_updates_mall() {
        // Arrange
        let db = InMemoryDatabase::new();
        let id = registered(&db, "Chez Nous").await;
        let tx = db.begin();

        // Act
        let events = handle_rename_restaurant(
            &rename(id, "Chez Vous"),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await
        .unwrap();
        tx.commit().unwrap();

        // Assert
        assert_eq!(events[0].metadata.event_name, RENAMED);
        assert_eq!(events[0].metadata.version, 2);
        assert_eq!(
            message_names(&db.outbox_messages()),
            vec![integration::REGISTERED, integration::RENAMED]
        );
        assert_eq!(db.read_model_rows::<MallRestaurant>()[0].name, "Chez Vous");
    }

    #[tokio::test]
    async fn test_rename_to_same_name_writes_nothing() {
        let db = InMemoryDatabase::new();
        let id = registered(&db, "Chez Nous").await;
        let tx = db.begin();

        let events = handle_rename_restaurant(
            &rename(id, "Chez Nous"),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await
        .unwrap();
        tx.commit().unwrap();

        assert!(events.is_empty());
        assert_eq!(db.events().len(), 1);
        assert_eq!(db.outbox_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_unit_of_work_leaves_no_event_and_no_message() {
        // Arrange
        let db = InMemoryDatabase::new();
        let tx = db.begin();
        handle_register_restaurant(
            &register(Uuid::new_v4(), "Chez Nous"),
            &FixedClock::default(),
            &unit_of_work(&tx),
        )
        .await
        .unwrap();

        // Act
        drop(tx);

        // Assert
        assert!(db.events().is_empty());
        assert!(db.outbox_messages().is_empty());
        assert!(db.read_model_rows::<MallRestaurant>().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_fail_command() {
        // Arrange
        let db = InMemoryDatabase::new();
        let tx = db.begin();
        let stores = RestaurantStores {
            snapshots: Arc::new(FailingSnapshotRepository),
            ..stores(&tx)
        };
        let uow = UnitOfWork::new(stores, registry(), SnapshotCadence::every(1));

        // Act
        let result = handle_register_restaurant(
            &register(Uuid::new_v4(), "Chez Nous"),
            &FixedClock::default(),
            &uow,
        )
        .await;
        tx.commit().unwrap();

        // Assert
        assert!(result.is_ok());
        assert_eq!(db.events().len(), 1);
        assert_eq!(db.outbox_messages().len(), 1);
        assert!(db.snapshots().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_written_at_cadence_and_used_on_load() {
        // Arrange
        let db = InMemoryDatabase::new();
        let id = registered(&db, "One").await;
        for name in ["Two", "Three"] {
            let tx = db.begin();
            handle_rename_restaurant(&rename(id, name), &FixedClock::default(), &unit_of_work(&tx))
                .await
                .unwrap();
            tx.commit().unwrap();
        }

        // Act
        let tx = db.begin();
        let restaurant = unit_of_work(&tx).repository().load(id).await.unwrap();

        // Assert
        let snapshots = db.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].stream_version, 3);
        assert_eq!(restaurant.name(), Some("Three"));
        assert_eq!(restaurant.version(), 3);
    }
}

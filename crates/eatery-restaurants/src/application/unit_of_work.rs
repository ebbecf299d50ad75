//! Wiring of one Restaurants unit of work.
//!
//! A unit of work is built per request from stores that all share the
//! request's transaction.

use std::sync::Arc;

use eatery_core::dispatcher::EventDispatcher;
use eatery_core::event_store::{EventRepository, EventStore};
use eatery_core::message::OutboxStore;
use eatery_core::registry::Registry;
use eatery_core::repository::AggregateRepository;
use eatery_core::snapshot::{SnapshotCadence, SnapshotRepository, SnapshotStore};
use eatery_event_store::pg_event_repository::PgEventRepository;
use eatery_event_store::pg_outbox_store::PgOutboxStore;
use eatery_event_store::pg_snapshot_repository::PgSnapshotRepository;
use eatery_event_store::transaction::PgScope;
use eatery_messaging::publisher::{EventPublisher, OutboxPublisher};

use super::event_handlers::{IntegrationEventHandler, MallProjection};
use crate::SCHEMA;
use crate::domain::aggregates::Restaurant;
use crate::domain::events::{REGISTERED, RENAMED, RestaurantDomainEvent};
use crate::read_model::{MallRepository, PgMallRepository};

/// The stores one unit of work writes to.
#[derive(Clone)]
pub struct RestaurantStores {
    /// Event rows.
    pub events: Arc<dyn EventRepository>,
    /// Snapshot rows.
    pub snapshots: Arc<dyn SnapshotRepository>,
    /// Outbox rows.
    pub outbox: Arc<dyn OutboxStore>,
    /// Mall read model.
    pub mall: Arc<MallRepository>,
}

impl RestaurantStores {
    /// PostgreSQL stores bound to `scope`.
    #[must_use]
    pub fn postgres(scope: impl Into<PgScope>) -> Self {
        let scope = scope.into();
        Self {
            events: Arc::new(PgEventRepository::new(scope.clone(), SCHEMA)),
            snapshots: Arc::new(PgSnapshotRepository::new(scope.clone(), SCHEMA)),
            outbox: Arc::new(PgOutboxStore::new(scope.clone(), SCHEMA)),
            mall: Arc::new(PgMallRepository::new(scope, SCHEMA)),
        }
    }
}

/// A snapshotting restaurant repository over `events` and `snapshots`.
#[must_use]
pub fn restaurant_repository(
    events: Arc<dyn EventRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    registry: Arc<Registry>,
    cadence: SnapshotCadence,
) -> AggregateRepository<Restaurant> {
    let store = SnapshotStore::new(
        Arc::new(EventStore::new(events, Arc::clone(&registry))),
        snapshots,
        registry,
        cadence,
    );
    AggregateRepository::new(Arc::new(store))
}

/// Repository and dispatcher of one unit of work.
pub struct UnitOfWork {
    repository: AggregateRepository<Restaurant>,
    dispatcher: EventDispatcher<RestaurantDomainEvent>,
}

impl UnitOfWork {
    /// Wires the snapshotting repository and subscribes the integration and
    /// mall handlers to every restaurant event.
    #[must_use]
    pub fn new(stores: RestaurantStores, registry: Arc<Registry>, cadence: SnapshotCadence) -> Self {
        let repository = restaurant_repository(
            stores.events,
            stores.snapshots,
            Arc::clone(&registry),
            cadence,
        );

        let publisher = EventPublisher::new(registry, Arc::new(OutboxPublisher::new(stores.outbox)));
        let mut dispatcher: EventDispatcher<RestaurantDomainEvent> = EventDispatcher::new();
        dispatcher.subscribe(
            Arc::new(IntegrationEventHandler::new(publisher)),
            &[REGISTERED, RENAMED],
        );
        dispatcher.subscribe(Arc::new(MallProjection::new(stores.mall)), &[REGISTERED, RENAMED]);

        Self {
            repository,
            dispatcher,
        }
    }

    /// The restaurant repository.
    #[must_use]
    pub fn repository(&self) -> &AggregateRepository<Restaurant> {
        &self.repository
    }

    /// The domain event dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher<RestaurantDomainEvent> {
        &self.dispatcher
    }
}

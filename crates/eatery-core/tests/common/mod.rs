//! A small counter aggregate and store wiring shared by the integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use eatery_core::aggregate::{AggregateBase, AggregateRoot};
use eatery_core::error::DomainError;
use eatery_core::event::{Event, EventKind, downcast_payload, unexpected_payload};
use eatery_core::event_store::{EventRepository, EventStore};
use eatery_core::registry::{Payload, Registry, RegistryBuilder};
use eatery_core::snapshot::{SnapshotCadence, SnapshotRepository, SnapshotStore};
use eatery_core::store::AggregateStore;
use eatery_test_support::FixedClock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const INCREMENTED: &str = "counters.Incremented";
pub const RESET: &str = "counters.Reset";
pub const SNAPSHOT: &str = "counters.CounterV1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incremented {
    pub by: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reset;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub total: i64,
    pub resets: u32,
}

#[derive(Debug, Clone)]
pub enum CounterEvent {
    Incremented(Incremented),
    Reset(Reset),
}

impl EventKind for CounterEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Incremented(_) => INCREMENTED,
            Self::Reset(_) => RESET,
        }
    }

    fn payload(&self) -> &(dyn Any + Send + Sync) {
        match self {
            Self::Incremented(p) => p,
            Self::Reset(p) => p,
        }
    }

    fn from_payload(
        aggregate_name: &str,
        event_name: &str,
        payload: Payload,
    ) -> Result<Self, DomainError> {
        match event_name {
            INCREMENTED => downcast_payload(aggregate_name, event_name, payload).map(Self::Incremented),
            RESET => downcast_payload(aggregate_name, event_name, payload).map(Self::Reset),
            _ => Err(unexpected_payload(aggregate_name, event_name)),
        }
    }
}

#[derive(Debug)]
pub struct Counter {
    base: AggregateBase<CounterEvent>,
    pub total: i64,
    pub resets: u32,
}

impl Counter {
    pub fn increment(&mut self, by: i64) {
        self.raise(CounterEvent::Incremented(Incremented { by }), &FixedClock::default());
    }

    pub fn reset(&mut self) {
        self.raise(CounterEvent::Reset(Reset), &FixedClock::default());
    }
}

impl AggregateRoot for Counter {
    type Event = CounterEvent;
    type Snapshot = CounterSnapshot;
    const AGGREGATE_NAME: &'static str = "counters.Counter";
    const SNAPSHOT_NAME: &'static str = SNAPSHOT;

    fn new(id: Uuid) -> Self {
        Self {
            base: AggregateBase::new(id),
            total: 0,
            resets: 0,
        }
    }

    fn base(&self) -> &AggregateBase<CounterEvent> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<CounterEvent> {
        &mut self.base
    }

    fn apply(&mut self, event: &Event<CounterEvent>) {
        match &event.kind {
            CounterEvent::Incremented(p) => self.total += p.by,
            CounterEvent::Reset(_) => {
                self.total = 0;
                self.resets += 1;
            }
        }
    }

    fn to_snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total,
            resets: self.resets,
        }
    }

    fn apply_snapshot(&mut self, snapshot: CounterSnapshot) {
        self.total = snapshot.total;
        self.resets = snapshot.resets;
    }
}

pub fn registry() -> Arc<Registry> {
    Arc::new(
        RegistryBuilder::new()
            .register_json::<Incremented>(INCREMENTED)
            .register_json::<Reset>(RESET)
            .register_json::<CounterSnapshot>(SNAPSHOT)
            .build()
            .unwrap(),
    )
}

pub fn event_store(events: Arc<dyn EventRepository>) -> Arc<dyn AggregateStore> {
    Arc::new(EventStore::new(events, registry()))
}

pub fn snapshot_store(
    events: Arc<dyn EventRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    every: i64,
) -> Arc<dyn AggregateStore> {
    let registry = registry();
    Arc::new(SnapshotStore::new(
        Arc::new(EventStore::new(events, Arc::clone(&registry))),
        snapshots,
        registry,
        SnapshotCadence::every(every),
    ))
}

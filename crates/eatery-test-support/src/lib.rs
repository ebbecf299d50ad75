//! Shared test doubles and utilities for Eatery services.
//!
//! The in-memory database models transactions closely enough to test outbox
//! atomicity and optimistic concurrency without PostgreSQL.

mod broker;
mod clock;
mod database;
mod repository;

pub use broker::{FailingBroker, RecordingBroker};
pub use clock::FixedClock;
pub use database::{InMemoryDatabase, InMemoryTransaction};
pub use repository::{
    FailingEventRepository, FailingSnapshotRepository, InMemoryEventRepository,
    InMemoryInboxStore, InMemoryOutboxStore, InMemoryReadModelRepository,
    InMemorySnapshotRepository,
};

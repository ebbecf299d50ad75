//! Eatery Core: event sourcing and messaging abstractions.
//!
//! This crate holds the serialization registry, the aggregate model, the
//! event and snapshot stores, the aggregate repository, the in-process event
//! dispatcher, the outbox/inbox contracts and the read model contract. Storage backends and brokers
//! implement the traits defined here; no infrastructure code lives in this
//! crate.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod event_store;
pub mod message;
pub mod read_model;
pub mod registry;
pub mod repository;
pub mod snapshot;
pub mod store;

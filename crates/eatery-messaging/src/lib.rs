//! Messaging for Eatery services.
//!
//! Moves integration messages between the database and the broker: the
//! outbox processor publishes committed outbox rows, the publishers turn
//! integration events into outbox rows, and the inbox handler deduplicates
//! inbound deliveries.

pub mod inbox;
pub mod processor;
pub mod publisher;
pub mod redis_broker;

//! PostgreSQL persistence for Eatery services.
//!
//! Implements the event, snapshot, outbox and inbox store traits from
//! `eatery-core` on top of sqlx, plus the transaction manager that scopes a
//! unit of work.

pub mod error;
pub mod pg_event_repository;
pub mod pg_inbox_store;
pub mod pg_outbox_store;
pub mod pg_snapshot_repository;
pub mod schema;
pub mod transaction;

//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use eatery_core::clock::Clock;
use eatery_core::registry::Registry;
use eatery_core::snapshot::SnapshotCadence;

use crate::database::Database;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Source of transactions and autocommit stores.
    pub database: Arc<dyn Database>,
    /// Payload registry of every context.
    pub registry: Arc<Registry>,
    /// Clock used to timestamp events.
    pub clock: Arc<dyn Clock>,
    /// When repositories write snapshots.
    pub snapshot_cadence: SnapshotCadence,
    /// Deadline for one request, retries included.
    pub request_timeout: Duration,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        database: Arc<dyn Database>,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
        snapshot_cadence: SnapshotCadence,
        request_timeout: Duration,
    ) -> Self {
        Self {
            database,
            registry,
            clock,
            snapshot_cadence,
            request_timeout,
        }
    }
}

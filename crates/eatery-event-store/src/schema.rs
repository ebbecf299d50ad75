//! Table naming and migrations.
//!
//! Every bounded context owns a PostgreSQL schema holding its own `events`,
//! `snapshots`, `outbox` and `inbox` tables. The DDL lives in the workspace
//! `migrations/` directory.

use sqlx::migrate::Migrator;

/// Migrations for every context schema.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Names the tables of one context schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    name: &'static str,
}

impl Schema {
    /// Creates a schema handle. `name` must be a plain SQL identifier.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// The schema name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Qualified name of the events table.
    #[must_use]
    pub fn events(&self) -> String {
        format!("{}.events", self.name)
    }

    /// Qualified name of the snapshots table.
    #[must_use]
    pub fn snapshots(&self) -> String {
        format!("{}.snapshots", self.name)
    }

    /// Qualified name of the outbox table.
    #[must_use]
    pub fn outbox(&self) -> String {
        format!("{}.outbox", self.name)
    }

    /// Qualified name of the inbox table.
    #[must_use]
    pub fn inbox(&self) -> String {
        format!("{}.inbox", self.name)
    }
}

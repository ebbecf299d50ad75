//! Snapshot store: a decorator that short-circuits replay with a compacted
//! checkpoint and decides when to write new checkpoints.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use crate::aggregate::EventSourced;
use crate::error::DomainError;
use crate::registry::Registry;
use crate::store::AggregateStore;

/// Stored representation of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    /// Stream this snapshot belongs to.
    pub stream_id: Uuid,
    /// Stream (aggregate type) name.
    pub stream_name: String,
    /// Version of the last event folded into the snapshot.
    pub stream_version: i64,
    /// Registry key of the payload.
    pub snapshot_name: String,
    /// Encoded payload.
    pub snapshot_data: Vec<u8>,
}

/// Row-level access to the snapshots table.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Returns the snapshot with the highest version, if any.
    async fn load_latest(
        &self,
        stream_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<SnapshotRecord>, DomainError>;

    /// Inserts or replaces the snapshot of the record's stream.
    async fn save(&self, record: &SnapshotRecord) -> Result<(), DomainError>;
}

/// Decides whether a save should be followed by a snapshot.
///
/// A snapshot is taken when the batch just appended crossed (or landed on) a
/// multiple of `every`, so batches that jump over a boundary are not missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCadence {
    every: i64,
}

impl SnapshotCadence {
    /// Cadence used when nothing is configured.
    pub const DEFAULT_EVERY: i64 = 50;

    /// Creates a cadence with threshold `every` (clamped to at least 1).
    #[must_use]
    pub fn every(every: i64) -> Self {
        Self {
            every: every.max(1),
        }
    }

    /// The configured threshold.
    #[must_use]
    pub fn threshold(&self) -> i64 {
        self.every
    }

    /// `pending_version` is the stream version after the save and
    /// `pending_changes` the number of events it appended.
    #[must_use]
    pub fn should_snapshot(&self, pending_version: i64, pending_changes: i64) -> bool {
        let n = self.every;
        pending_version >= n
            && (pending_changes >= n
                || pending_version % n < pending_changes
                || pending_version % n == 0)
    }
}

impl Default for SnapshotCadence {
    fn default() -> Self {
        Self::every(Self::DEFAULT_EVERY)
    }
}

/// [`AggregateStore`] decorator that loads from the latest snapshot and
/// replays only newer events through the wrapped store.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<dyn AggregateStore>,
    snapshots: Arc<dyn SnapshotRepository>,
    registry: Arc<Registry>,
    cadence: SnapshotCadence,
}

impl SnapshotStore {
    /// Wraps `inner` with snapshot support.
    #[must_use]
    pub fn new(
        inner: Arc<dyn AggregateStore>,
        snapshots: Arc<dyn SnapshotRepository>,
        registry: Arc<Registry>,
        cadence: SnapshotCadence,
    ) -> Self {
        Self {
            inner,
            snapshots,
            registry,
            cadence,
        }
    }
}

#[async_trait]
impl AggregateStore for SnapshotStore {
    #[instrument(
        skip_all,
        fields(stream_id = %aggregate.stream_id(), stream_name = aggregate.stream_name()),
        err
    )]
    async fn load(&self, aggregate: &mut dyn EventSourced) -> Result<(), DomainError> {
        let latest = self
            .snapshots
            .load_latest(aggregate.stream_id(), aggregate.stream_name())
            .await?;

        if let Some(record) = latest {
            let payload = self
                .registry
                .deserialize(&record.snapshot_name, &record.snapshot_data)?;
            aggregate.restore_snapshot(&record.snapshot_name, payload, record.stream_version)?;
            tracing::debug!(version = record.stream_version, "restored snapshot");
        }

        self.inner.load(aggregate).await
    }

    #[instrument(
        skip_all,
        fields(stream_id = %aggregate.stream_id(), stream_name = aggregate.stream_name()),
        err
    )]
    async fn save(&self, aggregate: &mut dyn EventSourced) -> Result<(), DomainError> {
        #[allow(clippy::cast_possible_wrap)]
        let pending_changes = aggregate.pending_events().len() as i64;
        let pending_version = aggregate.stream_version() + pending_changes;

        self.inner.save(aggregate).await?;

        if pending_changes == 0 || !self.cadence.should_snapshot(pending_version, pending_changes) {
            return Ok(());
        }

        let snapshot_name = aggregate.snapshot_name();
        let payload = aggregate.snapshot_payload();
        let record = self
            .registry
            .serialize(snapshot_name, &*payload)
            .map(|snapshot_data| SnapshotRecord {
                stream_id: aggregate.stream_id(),
                stream_name: aggregate.stream_name().to_owned(),
                stream_version: pending_version,
                snapshot_name: snapshot_name.to_owned(),
                snapshot_data,
            });

        let outcome = match record {
            Ok(record) => self.snapshots.save(&record).await,
            Err(e) => Err(e),
        };

        outcome.map_err(|e| {
            tracing::warn!(error = %e, version = pending_version, "snapshot write failed");
            DomainError::SnapshotFailed {
                stream_id: aggregate.stream_id(),
                stream_name: aggregate.stream_name().to_owned(),
                version: pending_version,
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_snapshots_when_batch_lands_on_threshold() {
        let cadence = SnapshotCadence::every(3);
        assert!(cadence.should_snapshot(3, 3));
    }

    #[test]
    fn test_cadence_skips_when_no_boundary_crossed() {
        let cadence = SnapshotCadence::every(3);
        assert!(!cadence.should_snapshot(4, 1));
    }

    #[test]
    fn test_cadence_snapshots_on_multiple_of_threshold() {
        let cadence = SnapshotCadence::every(3);
        assert!(cadence.should_snapshot(6, 2));
    }

    #[test]
    fn test_cadence_snapshots_when_batch_jumps_over_boundary() {
        // 5 -> 7 crosses 6 without landing on it.
        let cadence = SnapshotCadence::every(3);
        assert!(cadence.should_snapshot(7, 2));
    }

    #[test]
    fn test_cadence_never_snapshots_below_threshold() {
        let cadence = SnapshotCadence::every(3);
        assert!(!cadence.should_snapshot(2, 2));
        assert!(!cadence.should_snapshot(1, 1));
    }

    #[test]
    fn test_cadence_large_batch_always_snapshots() {
        let cadence = SnapshotCadence::every(3);
        assert!(cadence.should_snapshot(10, 4));
    }

    #[test]
    fn test_cadence_threshold_is_clamped() {
        assert_eq!(SnapshotCadence::every(0).threshold(), 1);
        assert_eq!(SnapshotCadence::default().threshold(), 50);
    }
}

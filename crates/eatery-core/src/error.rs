//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type shared by stores, repositories and handlers.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No stream (or read model row) exists for the requested identifier.
    #[error("{aggregate_name} not found: {aggregate_id}")]
    NotFound {
        /// The aggregate type name.
        aggregate_name: String,
        /// The identifier that was looked up.
        aggregate_id: Uuid,
    },

    /// Optimistic concurrency conflict: another writer already appended the
    /// stream version this writer tried to append.
    #[error("concurrency conflict on {stream_name} {stream_id}: version {version} already exists")]
    Conflict {
        /// The stream that had the conflict.
        stream_id: Uuid,
        /// The stream (aggregate type) name.
        stream_name: String,
        /// The version that could not be written.
        version: i64,
    },

    /// Unknown registry key or a payload that could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A decoded event or snapshot has a type the aggregate does not accept.
    #[error("{aggregate_name} received {payload_name} with an unexpected payload type")]
    UnexpectedPayload {
        /// The aggregate type name.
        aggregate_name: String,
        /// The registry key of the payload.
        payload_name: String,
    },

    /// A command was rejected by business rules.
    #[error("validation error: {0}")]
    Validation(String),

    /// Connectivity, timeout or other infrastructure failure.
    #[error("transient infrastructure error: {0}")]
    Transient(String),

    /// Events were persisted but the snapshot that should have followed them
    /// could not be written.
    #[error("snapshot of {stream_name} {stream_id} at version {version} failed: {reason}")]
    SnapshotFailed {
        /// The stream whose snapshot failed.
        stream_id: Uuid,
        /// The stream (aggregate type) name.
        stream_name: String,
        /// The version the snapshot was taken at.
        version: i64,
        /// Underlying failure.
        reason: String,
    },
}

impl DomainError {
    /// Whether the caller may retry the whole unit of work.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Transient(_))
    }

    /// Whether the error is warning-class: the state change it accompanies
    /// is already durable.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::SnapshotFailed { .. })
    }
}

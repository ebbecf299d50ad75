//! Command abstractions.

use uuid::Uuid;

/// A request to change the state of exactly one aggregate.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable name of the command, used as a tracing field.
    fn command_name(&self) -> &'static str;

    /// The aggregate the command targets.
    fn aggregate_id(&self) -> Uuid;
}

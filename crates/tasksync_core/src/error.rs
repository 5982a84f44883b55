//! Error types for the tasksync record model.

use crate::id::RecordId;
use crate::types::Collection;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while parsing or constructing core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An owner scope string was malformed.
    #[error("invalid owner scope: {0}")]
    InvalidScope(String),

    /// A collection name did not match any known table.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A record failed local validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A write rejected before it reaches any store.
///
/// Validation errors never reach sync: they are raised on the device that
/// attempts the write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A task listed itself as a blocker.
    #[error("task {0} cannot be blocked by itself")]
    SelfDependency(RecordId),

    /// The new blocked-by edge would close a cycle.
    #[error("blocking task {task} on {blocker} would create a dependency cycle")]
    DependencyCycle {
        /// The task gaining a blocker.
        task: RecordId,
        /// The blocker that already depends on `task`.
        blocker: RecordId,
    },

    /// A referenced task does not exist locally.
    #[error("unknown task {0}")]
    UnknownTask(RecordId),

    /// A required text field was blank.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Field name.
        field: &'static str,
    },

    /// The record body belongs to a different collection.
    #[error("expected a record for {expected}, got {actual}")]
    WrongCollection {
        /// Collection the write targeted.
        expected: Collection,
        /// Collection of the record body.
        actual: Collection,
    },
}

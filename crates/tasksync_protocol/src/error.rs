//! Error types for remote store calls.

use tasksync_core::{Collection, RecordId};
use thiserror::Error;

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Why the remote refused a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The target row was tombstoned upstream.
    Deleted,
    /// The target row exists under a different owner scope.
    ScopeChanged,
}

/// Errors returned by a [`crate::RemoteStore`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The write conflicts with upstream state. Recovered by the engine.
    #[error("conflict on {collection} record {id}: {reason:?}")]
    Conflict {
        /// Collection of the row.
        collection: Collection,
        /// Row id.
        id: RecordId,
        /// What upstream state caused the rejection.
        reason: ConflictReason,
    },

    /// The session may not touch this scope. Not retried automatically.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend could not be reached or the call timed out.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A row could not be mapped to or from the wire format.
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    /// The backend failed while handling the call.
    #[error("server error: {0}")]
    Server(String),
}

impl RemoteError {
    /// Returns true if the call can succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::NetworkUnavailable(_) | RemoteError::Server(_)
        )
    }

    /// Returns true for authorization failures.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

/// Errors raised by the wire mapping adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A row could not be decoded into the collection's schema.
    #[error("invalid {collection} row {id}: {message}")]
    InvalidRow {
        /// Target collection.
        collection: Collection,
        /// Row id.
        id: RecordId,
        /// Decoder message.
        message: String,
    },

    /// A record's fields could not be encoded.
    #[error("cannot encode record {id}: {message}")]
    Encode {
        /// Record id.
        id: RecordId,
        /// Encoder message.
        message: String,
    },
}

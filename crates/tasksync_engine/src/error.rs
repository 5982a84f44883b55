//! Error types for the sync engine.

use std::fmt;
use tasksync_core::{Collection, RecordId};
use tasksync_protocol::RemoteError;
use tasksync_store::StoreError;
use thiserror::Error;

/// Result type for handle-level sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by scheduler and coordinator handles.
///
/// A sync pass itself never fails; its problems are reported per record in
/// [`crate::SyncSummary::errors`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The scheduler task has stopped.
    #[error("sync scheduler has stopped")]
    SchedulerStopped,
}

/// Which half of a pass an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Pulling remote changes.
    Pull,
    /// Pushing local changes.
    Push,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Pull => f.write_str("pull"),
            SyncPhase::Push => f.write_str("push"),
        }
    }
}

/// Classification of a per-record failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// The session may not access the scope.
    Unauthorized,
    /// The backend was unreachable or timed out.
    NetworkUnavailable,
    /// The backend failed or returned an unusable row.
    Remote,
    /// The local store failed.
    Store,
}

impl SyncErrorKind {
    /// Returns true if a later pass may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncErrorKind::NetworkUnavailable | SyncErrorKind::Remote)
    }
}

impl From<&RemoteError> for SyncErrorKind {
    fn from(err: &RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized(_) => SyncErrorKind::Unauthorized,
            RemoteError::NetworkUnavailable(_) => SyncErrorKind::NetworkUnavailable,
            RemoteError::Conflict { .. } | RemoteError::Wire(_) | RemoteError::Server(_) => {
                SyncErrorKind::Remote
            }
        }
    }
}

/// A failure accumulated during a pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase} {collection}{}: {message}", .id.map(|id| format!(" {id}")).unwrap_or_default())]
pub struct RecordError {
    /// Phase the failure happened in.
    pub phase: SyncPhase,
    /// Collection being synced.
    pub collection: Collection,
    /// Affected record, if the failure was record-specific.
    pub id: Option<RecordId>,
    /// Classification.
    pub kind: SyncErrorKind,
    /// Underlying error message.
    pub message: String,
}

impl RecordError {
    /// Builds an error from a failed remote call.
    pub fn remote(
        phase: SyncPhase,
        collection: Collection,
        id: Option<RecordId>,
        err: &RemoteError,
    ) -> Self {
        Self {
            phase,
            collection,
            id,
            kind: err.into(),
            message: err.to_string(),
        }
    }

    /// Builds an error from a failed local store call.
    pub fn store(
        phase: SyncPhase,
        collection: Collection,
        id: Option<RecordId>,
        err: &StoreError,
    ) -> Self {
        Self {
            phase,
            collection,
            id,
            kind: SyncErrorKind::Store,
            message: err.to_string(),
        }
    }

    /// Returns true for authorization failures.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == SyncErrorKind::Unauthorized
    }
}

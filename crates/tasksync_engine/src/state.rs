//! Sync status and pass results.

use crate::error::RecordError;
use std::time::Duration;
use tasksync_core::{OwnerScope, Timestamp};
use tasksync_protocol::Conflict;

/// Coarse sync state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass running, last pass healthy.
    Idle,
    /// A pass is running.
    Syncing,
    /// The last pass hit a scope-level failure.
    Error,
}

impl SyncState {
    /// Returns true while a pass runs.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

/// Observable sync status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// True while any pass runs.
    pub syncing: bool,
    /// When the last pass finished without errors.
    pub last_synced_at: Option<Timestamp>,
    /// Message of the last scope-level failure; cleared by the next pass
    /// that gets through.
    pub error: Option<String>,
}

impl SyncStatus {
    /// Returns the coarse state.
    pub fn state(&self) -> SyncState {
        if self.syncing {
            SyncState::Syncing
        } else if self.error.is_some() {
            SyncState::Error
        } else {
            SyncState::Idle
        }
    }
}

/// Cumulative statistics across passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Passes completed.
    pub passes: u64,
    /// Remote changes applied locally.
    pub pulled: u64,
    /// Local changes acknowledged by the remote.
    pub pushed: u64,
    /// Conflicts resolved.
    pub conflicts: u64,
    /// Per-record errors.
    pub errors: u64,
    /// Passes that ended in a scope-level failure.
    pub fatal_passes: u64,
}

/// Result of one sync pass.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Scope the pass ran for.
    pub scope: OwnerScope,
    /// Remote changes applied locally.
    pub pulled: usize,
    /// Local changes acknowledged by the remote.
    pub pushed: usize,
    /// Conflicts detected and resolved.
    pub conflicts: Vec<Conflict>,
    /// Failures, accumulated rather than raised.
    pub errors: Vec<RecordError>,
    /// Remote calls issued.
    pub remote_calls: usize,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl SyncSummary {
    pub(crate) fn new(scope: OwnerScope) -> Self {
        Self {
            scope,
            pulled: 0,
            pushed: 0,
            conflicts: Vec::new(),
            errors: Vec::new(),
            remote_calls: 0,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if at least one change was applied on either side.
    pub fn made_progress(&self) -> bool {
        self.pulled > 0 || self.pushed > 0
    }

    /// Returns true if anything failed.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if every remote call was refused as unauthorized.
    ///
    /// Such a pass is not retried automatically; the session needs
    /// attention.
    pub fn is_fatal(&self) -> bool {
        self.remote_calls > 0
            && self.errors.iter().filter(|e| e.is_unauthorized()).count() == self.remote_calls
    }

    /// Returns the first failure message, if any.
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(ToString::to_string)
    }
}

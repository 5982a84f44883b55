//! The generic syncable record.

use crate::entity::{EntityBody, Task};
use crate::id::RecordId;
use crate::types::{Collection, OwnerScope, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-row sync bookkeeping.
///
/// # Invariants
///
/// - `synced_at <= local_updated_at`
/// - `synced_at <= remote_updated_at`
///
/// A record is never marked synced ahead of its last known mutation on
/// either side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Last local mutation. Monotonic per device.
    pub local_updated_at: Timestamp,
    /// Last server-assigned `updated_at` seen for this row.
    pub remote_updated_at: Option<Timestamp>,
    /// When local and remote were last known equal; `None` if never synced.
    pub synced_at: Option<Timestamp>,
    /// Tombstone marker; `None` while the record is live.
    pub deleted_at: Option<Timestamp>,
}

impl SyncMeta {
    /// Returns true if the row carries a local change the remote has not
    /// acknowledged.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match self.synced_at {
            Some(synced) => self.local_updated_at > synced,
            None => true,
        }
    }

    /// Returns true if the row is tombstoned.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true if the remote has a version newer than the last sync.
    #[must_use]
    pub fn remote_advanced(&self, remote_updated_at: Timestamp) -> bool {
        match self.synced_at {
            Some(synced) => remote_updated_at > synced,
            None => true,
        }
    }

    /// Checks the ordering invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let Some(synced) = self.synced_at else {
            return true;
        };
        synced <= self.local_updated_at && self.remote_updated_at.is_some_and(|r| synced <= r)
    }
}

/// A record as stored on either side of the sync boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncableRecord {
    /// Stable, globally-unique id.
    pub id: RecordId,
    /// Owner partition.
    pub scope: OwnerScope,
    /// Typed fields.
    pub body: EntityBody,
    /// Sync bookkeeping.
    #[serde(default)]
    pub meta: SyncMeta,
}

impl SyncableRecord {
    /// Creates a fresh, never-synced record with a random id.
    pub fn new(scope: OwnerScope, body: impl Into<EntityBody>) -> Self {
        Self::with_id(RecordId::new(), scope, body)
    }

    /// Creates a fresh, never-synced record with the given id.
    pub fn with_id(id: RecordId, scope: OwnerScope, body: impl Into<EntityBody>) -> Self {
        Self {
            id,
            scope,
            body: body.into(),
            meta: SyncMeta::default(),
        }
    }

    /// Returns the collection this record lives in.
    pub fn collection(&self) -> Collection {
        self.body.collection()
    }

    /// Returns true if the record is tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.meta.is_deleted()
    }

    /// Returns true if the record has unpushed local changes.
    pub fn is_dirty(&self) -> bool {
        self.meta.is_dirty()
    }

    /// Returns the task fields, if this is a task.
    pub fn as_task(&self) -> Option<&Task> {
        self.body.as_task()
    }
}

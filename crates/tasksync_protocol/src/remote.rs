//! Remote store contract.

use crate::error::RemoteResult;
use async_trait::async_trait;
use tasksync_core::{Collection, OwnerScope, RecordId, SyncableRecord, Timestamp};

/// The hosted backend datastore, shared by all devices of a scope.
///
/// The remote is the source of truth for `updated_at`: every successful
/// write returns the authoritative timestamp it assigned, and later writes
/// always receive strictly greater timestamps.
///
/// # Errors
///
/// Every call may fail with `NetworkUnavailable` or `Unauthorized`.
/// Writes may also fail with `Conflict` when upstream state rejects them.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates or replaces a row from the record's fields and returns the
    /// `updated_at` the backend assigned.
    ///
    /// Fails with `Conflict(Deleted)` if the row is tombstoned upstream and
    /// `Conflict(ScopeChanged)` if the id exists under another scope.
    async fn upsert(&self, collection: Collection, record: &SyncableRecord)
        -> RemoteResult<Timestamp>;

    /// Returns rows of `scope`, tombstones included, with
    /// `updated_at > since` (all rows when `since` is `None`), ordered by
    /// `updated_at` ascending.
    async fn query(
        &self,
        collection: Collection,
        scope: OwnerScope,
        since: Option<Timestamp>,
    ) -> RemoteResult<Vec<SyncableRecord>>;

    /// Tombstones a row and returns the assigned `updated_at`.
    ///
    /// Deleting an id the backend has never seen records a tombstone, so the
    /// call is idempotent from the caller's view. Deleting an existing
    /// tombstone fails with `Conflict(Deleted)`.
    async fn delete(
        &self,
        collection: Collection,
        scope: OwnerScope,
        id: RecordId,
    ) -> RemoteResult<Timestamp>;
}

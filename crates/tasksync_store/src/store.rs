//! Local store trait definition.

use crate::error::StoreResult;
use crate::filter::RecordFilter;
use tasksync_core::{Collection, OwnerScope, RecordId, SyncableRecord, Timestamp};

/// Where a write comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A user action on this device. Bumps `local_updated_at` and runs
    /// local validation.
    Local,
    /// A remote record applied by a pull. Stored with the sync metadata the
    /// engine supplies.
    Pull,
}

/// The per-device embedded datastore.
///
/// Every effect is visible to subsequent reads on the same device
/// immediately. Implementations must be `Send + Sync`; calls are
/// synchronous and expected not to block for long.
///
/// # Invariants
///
/// - `delete` tombstones, it never physically removes a row
/// - `get` and `query` never return tombstoned rows
/// - A local write always leaves the row dirty (`local_updated_at >
///   synced_at`), even when the device clock trails the server's
/// - `synced_at` never exceeds `local_updated_at` or `remote_updated_at`
pub trait LocalStore: Send + Sync {
    /// Reads a live record. `None` is the not-found outcome.
    fn get(&self, collection: Collection, id: RecordId) -> StoreResult<Option<SyncableRecord>>;

    /// Reads a record including tombstones. Used by the sync engine.
    fn lookup(&self, collection: Collection, id: RecordId)
        -> StoreResult<Option<SyncableRecord>>;

    /// Returns live records matching `filter`, in creation order.
    fn query(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<SyncableRecord>>;

    /// Inserts or replaces a record and returns the stored row.
    ///
    /// # Errors
    ///
    /// For [`WriteOrigin::Local`] writes:
    /// - `Validation` if a field rule fails or the blocked-by set would
    ///   introduce a cycle
    /// - `Tombstoned` if the id has been deleted
    fn upsert(&self, record: SyncableRecord, origin: WriteOrigin) -> StoreResult<SyncableRecord>;

    /// Records that local and remote agree as of `at`.
    ///
    /// Sets `synced_at` and `remote_updated_at`, raising `local_updated_at`
    /// to `at` if it trails.
    fn mark_synced(&self, collection: Collection, id: RecordId, at: Timestamp) -> StoreResult<()>;

    /// Acknowledges a push of the row version stamped `pushed_local`.
    ///
    /// Behaves like [`LocalStore::mark_synced`] unless the row was edited
    /// while the push was in flight, in which case the row stays dirty and
    /// only its `remote_updated_at` moves. Returns true if the row is clean
    /// afterwards.
    fn acknowledge_push(
        &self,
        collection: Collection,
        id: RecordId,
        pushed_local: Timestamp,
        at: Timestamp,
    ) -> StoreResult<bool>;

    /// Tombstones a record. Deleting a tombstone is a no-op.
    fn delete(&self, collection: Collection, id: RecordId) -> StoreResult<()>;

    /// Returns dirty rows and unsynced tombstones owned by `scope`, in
    /// creation order.
    fn pending(&self, collection: Collection, scope: OwnerScope)
        -> StoreResult<Vec<SyncableRecord>>;

    /// Returns the pull watermark for a scope's collection.
    fn watermark(&self, scope: OwnerScope, collection: Collection)
        -> StoreResult<Option<Timestamp>>;

    /// Persists the pull watermark for a scope's collection.
    fn set_watermark(
        &self,
        scope: OwnerScope,
        collection: Collection,
        at: Timestamp,
    ) -> StoreResult<()>;
}

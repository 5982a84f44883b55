//! In-memory local store.

use crate::error::{StoreError, StoreResult};
use crate::filter::RecordFilter;
use crate::store::{LocalStore, WriteOrigin};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tasksync_core::{
    Clock, Collection, DependencyGraph, OwnerScope, RecordId, SyncMeta, SyncableRecord,
    SystemClock, Timestamp, ValidationError,
};
use tracing::trace;

/// An in-memory local store.
///
/// This store keeps every row in memory and is suitable for:
/// - Unit and integration tests
/// - Simulated devices
/// - Ephemeral sessions that don't need persistence
///
/// # Thread Safety
///
/// All state sits behind one lock, so a local write validates the
/// blocked-by graph and persists the row atomically.
pub struct MemoryLocalStore {
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<(Collection, RecordId), Row>,
    next_seq: u64,
    last_stamp: Timestamp,
    watermarks: HashMap<(OwnerScope, Collection), Timestamp>,
}

struct Row {
    seq: u64,
    record: SyncableRecord,
}

impl Inner {
    /// Issues a local mutation timestamp.
    ///
    /// Never repeats or goes backwards, and always lands past the row's
    /// previous stamps so the write reads as dirty.
    fn stamp(&mut self, now: Timestamp, previous: Option<&SyncMeta>) -> Timestamp {
        let mut stamp = now.max(self.last_stamp.next());
        if let Some(meta) = previous {
            stamp = stamp.max(meta.local_updated_at.next());
            if let Some(synced) = meta.synced_at {
                stamp = stamp.max(synced.next());
            }
        }
        self.last_stamp = stamp;
        stamp
    }

    fn row(&self, collection: Collection, id: RecordId) -> Option<&SyncableRecord> {
        self.rows.get(&(collection, id)).map(|row| &row.record)
    }

    fn row_mut(&mut self, collection: Collection, id: RecordId) -> StoreResult<&mut SyncableRecord> {
        self.rows
            .get_mut(&(collection, id))
            .map(|row| &mut row.record)
            .ok_or(StoreError::NotFound { collection, id })
    }

    fn put(&mut self, record: SyncableRecord) {
        let key = (record.collection(), record.id);
        match self.rows.get_mut(&key) {
            Some(row) => row.record = record,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.rows.insert(key, Row { seq, record });
            }
        }
    }

    fn collect<F>(&self, collection: Collection, keep: F) -> Vec<SyncableRecord>
    where
        F: Fn(&SyncableRecord) -> bool,
    {
        let mut rows: Vec<&Row> = self
            .rows
            .iter()
            .filter(|((c, _), row)| *c == collection && keep(&row.record))
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter().map(|row| row.record.clone()).collect()
    }

    fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_edges(self.rows.iter().filter_map(|((c, id), row)| {
            if *c != Collection::Tasks || row.record.is_deleted() {
                return None;
            }
            row.record.as_task().map(|task| (*id, &task.blocked_by))
        }))
    }

    fn validate_local(&self, record: &SyncableRecord) -> StoreResult<()> {
        record.body.validate()?;

        let Some(task) = record.as_task() else {
            return Ok(());
        };
        for &blocker in &task.blocked_by {
            let known = self
                .row(Collection::Tasks, blocker)
                .is_some_and(|r| !r.is_deleted());
            if !known && blocker != record.id {
                return Err(ValidationError::UnknownTask(blocker).into());
            }
        }
        self.dependency_graph()
            .check_blockers(record.id, &task.blocked_by)?;
        Ok(())
    }
}

impl MemoryLocalStore {
    /// Creates an empty store stamping writes with the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Returns the number of rows, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// Returns true if the store holds no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }

    /// Returns the number of tombstoned rows.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.inner
            .read()
            .rows
            .values()
            .filter(|row| row.record.is_deleted())
            .count()
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, collection: Collection, id: RecordId) -> StoreResult<Option<SyncableRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .row(collection, id)
            .filter(|r| !r.is_deleted())
            .cloned())
    }

    fn lookup(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> StoreResult<Option<SyncableRecord>> {
        Ok(self.inner.read().row(collection, id).cloned())
    }

    fn query(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<SyncableRecord>> {
        let inner = self.inner.read();
        Ok(inner.collect(collection, |r| !r.is_deleted() && filter.matches(r)))
    }

    fn upsert(&self, mut record: SyncableRecord, origin: WriteOrigin) -> StoreResult<SyncableRecord> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let collection = record.collection();

        if origin == WriteOrigin::Local {
            let previous = inner.row(collection, record.id).map(|r| r.meta);
            if previous.is_some_and(|meta| meta.is_deleted()) {
                return Err(StoreError::Tombstoned {
                    collection,
                    id: record.id,
                });
            }
            inner.validate_local(&record)?;

            let stamp = inner.stamp(now, previous.as_ref());
            record.meta = SyncMeta {
                local_updated_at: stamp,
                deleted_at: None,
                ..previous.unwrap_or_default()
            };
        }

        trace!(%collection, id = %record.id, ?origin, meta = ?record.meta, "upsert");
        inner.put(record.clone());
        Ok(record)
    }

    fn mark_synced(&self, collection: Collection, id: RecordId, at: Timestamp) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let record = inner.row_mut(collection, id)?;
        let meta = &mut record.meta;
        meta.synced_at = Some(at);
        meta.remote_updated_at = Some(meta.remote_updated_at.map_or(at, |r| r.max(at)));
        meta.local_updated_at = meta.local_updated_at.max(at);
        trace!(%collection, %id, %at, "marked synced");
        Ok(())
    }

    fn acknowledge_push(
        &self,
        collection: Collection,
        id: RecordId,
        pushed_local: Timestamp,
        at: Timestamp,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let record = inner.row_mut(collection, id)?;
        let meta = &mut record.meta;

        if meta.local_updated_at == pushed_local {
            meta.synced_at = Some(at);
            meta.remote_updated_at = Some(at);
            meta.local_updated_at = meta.local_updated_at.max(at);
            return Ok(true);
        }

        // Edited while the push was in flight; keep the newer edit dirty.
        meta.remote_updated_at = Some(at);
        meta.synced_at = Some(at.min(pushed_local));
        trace!(%collection, %id, %at, "push acknowledged, row edited meanwhile");
        Ok(false)
    }

    fn delete(&self, collection: Collection, id: RecordId) -> StoreResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let previous = inner
            .row(collection, id)
            .map(|r| r.meta)
            .ok_or(StoreError::NotFound { collection, id })?;
        if previous.is_deleted() {
            return Ok(());
        }

        let stamp = inner.stamp(now, Some(&previous));
        let record = inner.row_mut(collection, id)?;
        record.meta.local_updated_at = stamp;
        record.meta.deleted_at = Some(stamp);
        trace!(%collection, %id, %stamp, "tombstoned");
        Ok(())
    }

    fn pending(
        &self,
        collection: Collection,
        scope: OwnerScope,
    ) -> StoreResult<Vec<SyncableRecord>> {
        let inner = self.inner.read();
        Ok(inner.collect(collection, |r| r.scope == scope && r.is_dirty()))
    }

    fn watermark(
        &self,
        scope: OwnerScope,
        collection: Collection,
    ) -> StoreResult<Option<Timestamp>> {
        Ok(self.inner.read().watermarks.get(&(scope, collection)).copied())
    }

    fn set_watermark(
        &self,
        scope: OwnerScope,
        collection: Collection,
        at: Timestamp,
    ) -> StoreResult<()> {
        self.inner.write().watermarks.insert((scope, collection), at);
        Ok(())
    }
}

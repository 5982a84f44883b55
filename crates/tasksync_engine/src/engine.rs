//! The sync engine.

use crate::config::SyncConfig;
use crate::error::{RecordError, SyncPhase};
use crate::state::{SyncStats, SyncStatus, SyncSummary};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tasksync_core::{
    Clock, Collection, OwnerScope, RecordId, SyncMeta, SyncableRecord, SystemClock, Timestamp,
};
use tasksync_protocol::{Conflict, ConflictReason, ConflictResolution, RemoteError, RemoteResult, RemoteStore};
use tasksync_store::{LocalStore, StoreResult, WriteOrigin};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What happened to one pulled record.
#[derive(Debug)]
enum PullOutcome {
    /// Nothing newer than what the device already had.
    Skipped,
    /// Remote fields were written locally.
    Applied,
    /// A conflict was resolved.
    Conflict(Conflict),
}

/// Keeps one device's local store consistent with the remote store.
///
/// The engine owns its two stores and is constructed once per session.
/// [`SyncEngine::run_sync_pass`] is the only entry point that moves data;
/// the scheduler decides when to call it.
///
/// # Concurrency
///
/// Passes for the same scope are serialized: a second call waits for the
/// first to finish. Passes for distinct scopes run concurrently.
pub struct SyncEngine<L: ?Sized, R: ?Sized> {
    config: SyncConfig,
    local: Arc<L>,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    scope_locks: Mutex<HashMap<OwnerScope, Arc<tokio::sync::Mutex<()>>>>,
    in_flight: AtomicUsize,
    status: watch::Sender<SyncStatus>,
    stats: RwLock<SyncStats>,
}

impl<L, R> SyncEngine<L, R>
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    /// Creates an engine over the given stores.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            config,
            local,
            remote,
            clock: Arc::new(SystemClock),
            scope_locks: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            status,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Sets the clock used for `last_synced_at`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn local(&self) -> &Arc<L> {
        &self.local
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Runs one pull-then-push pass for `scope`.
    ///
    /// Never fails: per-record problems are collected in the summary and the
    /// rest of the pass continues. A collection whose pull failed is not
    /// pushed in the same pass.
    pub async fn run_sync_pass(&self, scope: OwnerScope) -> SyncSummary {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let started = Instant::now();
        self.begin();
        let mut summary = SyncSummary::new(scope);

        for &collection in &self.config.collections {
            if self.pull(collection, scope, &mut summary).await {
                self.push(collection, scope, &mut summary).await;
            }
        }

        summary.duration = started.elapsed();
        self.finish(&summary);
        info!(
            %scope,
            pulled = summary.pulled,
            pushed = summary.pushed,
            conflicts = summary.conflicts.len(),
            errors = summary.errors.len(),
            elapsed_ms = summary.duration.as_millis() as u64,
            "sync pass finished"
        );
        summary
    }

    fn scope_lock(&self, scope: OwnerScope) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.scope_locks.lock().entry(scope).or_default())
    }

    /// Returns how many scopes currently have a pass lock.
    pub fn locked_scopes(&self) -> usize {
        self.scope_locks.lock().len()
    }

    /// Forgets the pass lock of a scope that is no longer synced.
    ///
    /// A lock held by a running or waiting pass is kept; the next pass for
    /// the scope creates a fresh one.
    pub fn release_scope(&self, scope: OwnerScope) {
        let mut locks = self.scope_locks.lock();
        if locks.get(&scope).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&scope);
            debug!(%scope, "released scope lock");
        }
    }

    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.status.send_modify(|status| status.syncing = true);
    }

    fn finish(&self, summary: &SyncSummary) {
        let still_running = self.in_flight.fetch_sub(1, Ordering::SeqCst) > 1;
        let now = self.clock.now();
        self.status.send_modify(|status| {
            status.syncing = still_running;
            if summary.is_fatal() {
                status.error = summary.first_error();
            } else {
                status.error = None;
                if !summary.has_errors() {
                    status.last_synced_at = Some(now);
                }
            }
        });

        let mut stats = self.stats.write();
        stats.passes += 1;
        stats.pulled += summary.pulled as u64;
        stats.pushed += summary.pushed as u64;
        stats.conflicts += summary.conflicts.len() as u64;
        stats.errors += summary.errors.len() as u64;
        if summary.is_fatal() {
            stats.fatal_passes += 1;
        }
    }

    /// Bounds a remote call by the request timeout.
    async fn call<T>(&self, request: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::NetworkUnavailable(format!(
                "request timed out after {:?}",
                self.config.request_timeout
            ))),
        }
    }

    /// Pulls one collection. Returns false if the collection could not be
    /// pulled at all.
    async fn pull(
        &self,
        collection: Collection,
        scope: OwnerScope,
        summary: &mut SyncSummary,
    ) -> bool {
        let since = match self.local.watermark(scope, collection) {
            Ok(since) => since,
            Err(e) => {
                summary.errors.push(RecordError::store(SyncPhase::Pull, collection, None, &e));
                return false;
            }
        };

        summary.remote_calls += 1;
        let rows = match self.call(self.remote.query(collection, scope, since)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(%collection, %scope, error = %e, "pull failed");
                summary.errors.push(RecordError::remote(SyncPhase::Pull, collection, None, &e));
                return false;
            }
        };

        let mut high = since;
        let mut complete = true;
        for remote in rows {
            let id = remote.id;
            let remote_ts = remote
                .meta
                .remote_updated_at
                .unwrap_or(remote.meta.local_updated_at);

            match self.apply_remote(collection, remote, remote_ts) {
                Ok(PullOutcome::Skipped) => {}
                Ok(PullOutcome::Applied) => summary.pulled += 1,
                Ok(PullOutcome::Conflict(conflict)) => {
                    if conflict.resolution.remote_wins() {
                        summary.pulled += 1;
                    }
                    summary.conflicts.push(conflict);
                }
                Err(e) => {
                    complete = false;
                    summary.errors.push(RecordError::store(SyncPhase::Pull, collection, Some(id), &e));
                }
            }
            high = high.max(Some(remote_ts));
        }

        // A failed row is fetched again next pass.
        if complete && high > since {
            if let Some(at) = high {
                if let Err(e) = self.local.set_watermark(scope, collection, at) {
                    summary.errors.push(RecordError::store(SyncPhase::Pull, collection, None, &e));
                }
            }
        }
        true
    }

    fn apply_remote(
        &self,
        collection: Collection,
        remote: SyncableRecord,
        remote_ts: Timestamp,
    ) -> StoreResult<PullOutcome> {
        let Some(mut local) = self.local.lookup(collection, remote.id)? else {
            debug!(%collection, id = %remote.id, %remote_ts, "materializing remote record");
            self.local.upsert(adopt(remote, remote_ts), WriteOrigin::Pull)?;
            return Ok(PullOutcome::Applied);
        };

        if !local.meta.remote_advanced(remote_ts) {
            return Ok(PullOutcome::Skipped);
        }

        // Rows carry the client edit time as their local time.
        let Some(conflict) = Conflict::detect(
            collection,
            remote.id,
            &local.meta,
            remote_ts,
            remote.meta.local_updated_at,
            remote.is_deleted(),
        ) else {
            debug!(%collection, id = %remote.id, %remote_ts, "clean pull");
            self.local.upsert(adopt(remote, remote_ts), WriteOrigin::Pull)?;
            return Ok(PullOutcome::Applied);
        };

        debug!(
            %collection,
            id = %remote.id,
            local_ts = %conflict.local_updated_at,
            %remote_ts,
            resolution = ?conflict.resolution,
            "conflict resolved"
        );
        match conflict.resolution {
            ConflictResolution::KeepLocal => {
                // The row stays dirty and the push half sends it.
                local.meta.remote_updated_at = local.meta.remote_updated_at.max(Some(remote_ts));
                self.local.upsert(local, WriteOrigin::Pull)?;
            }
            ConflictResolution::AcceptRemote | ConflictResolution::ApplyTombstone => {
                self.local.upsert(adopt(remote, remote_ts), WriteOrigin::Pull)?;
            }
        }
        Ok(PullOutcome::Conflict(conflict))
    }

    /// Pushes one collection's dirty rows and tombstones.
    async fn push(&self, collection: Collection, scope: OwnerScope, summary: &mut SyncSummary) {
        let pending = match self.local.pending(collection, scope) {
            Ok(pending) => pending,
            Err(e) => {
                summary.errors.push(RecordError::store(SyncPhase::Push, collection, None, &e));
                return;
            }
        };

        for record in pending {
            let id = record.id;
            let pushed_local = record.meta.local_updated_at;
            summary.remote_calls += 1;

            let result = if record.is_deleted() {
                self.call(self.remote.delete(collection, scope, id)).await
            } else {
                self.call(self.remote.upsert(collection, &record)).await
            };

            let stored = match result {
                Ok(at) => {
                    debug!(%collection, %id, %at, deleted = record.is_deleted(), "pushed");
                    summary.pushed += 1;
                    self.local
                        .acknowledge_push(collection, id, pushed_local, at)
                        .map(|_| ())
                }
                Err(RemoteError::Conflict { reason, .. }) => {
                    debug!(%collection, %id, ?reason, "push rejected, applying remote deletion");
                    let remote_at = record.meta.remote_updated_at.unwrap_or_default();
                    summary.conflicts.push(Conflict {
                        collection,
                        id,
                        local_updated_at: pushed_local,
                        remote_updated_at: remote_at,
                        remote_edited_at: remote_at,
                        remote_deleted: reason == ConflictReason::Deleted,
                        resolution: ConflictResolution::ApplyTombstone,
                    });
                    self.tombstone_synced(collection, id)
                }
                Err(e) => {
                    warn!(%collection, %id, error = %e, "push failed");
                    summary.errors.push(RecordError::remote(SyncPhase::Push, collection, Some(id), &e));
                    Ok(())
                }
            };

            if let Err(e) = stored {
                summary.errors.push(RecordError::store(SyncPhase::Push, collection, Some(id), &e));
            }
        }
    }

    /// Applies a deletion the remote already holds and marks it settled.
    fn tombstone_synced(&self, collection: Collection, id: RecordId) -> StoreResult<()> {
        self.local.delete(collection, id)?;
        if let Some(row) = self.local.lookup(collection, id)? {
            self.local.mark_synced(collection, id, row.meta.local_updated_at)?;
        }
        Ok(())
    }
}

/// Prepares a remote record for storage as the agreed-upon version.
fn adopt(mut remote: SyncableRecord, remote_ts: Timestamp) -> SyncableRecord {
    remote.meta = SyncMeta {
        local_updated_at: remote_ts,
        remote_updated_at: Some(remote_ts),
        synced_at: Some(remote_ts),
        deleted_at: remote.meta.deleted_at,
    };
    remote
}

impl<L: ?Sized, R: ?Sized> std::fmt::Debug for SyncEngine<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

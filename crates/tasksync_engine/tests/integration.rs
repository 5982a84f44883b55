//! Integration tests for the sync engine against the in-process service.

use std::sync::Arc;
use std::time::Duration;
use tasksync_core::{Collection, ManualClock, OwnerScope, RecordId, SyncableRecord, Task, Timestamp};
use tasksync_engine::{
    BackoffConfig, SchedulerConfig, SchedulerPhase, SyncConfig, SyncCoordinator, SyncEngine,
    SyncScheduler, SyncSummary, TriggerReason,
};
use tasksync_protocol::{ChangeFeed, ConflictResolution};
use tasksync_server::{RemoteService, RemoteSession, ServiceConfig, Session};
use tasksync_store::{tasks, LocalStore, MemoryLocalStore, WriteOrigin};
use uuid::Uuid;

/// A simulated device: its own clock, store and engine.
struct Device {
    clock: Arc<ManualClock>,
    store: Arc<MemoryLocalStore>,
    remote: RemoteSession,
    engine: Arc<SyncEngine<MemoryLocalStore, RemoteSession>>,
}

impl Device {
    fn new(service: &Arc<RemoteService>, session: Session, start: u64) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryLocalStore::with_clock(clock.clone()));
        let remote = service.connect(session);
        let engine = Arc::new(
            SyncEngine::new(SyncConfig::default(), Arc::clone(&store), Arc::new(remote.clone()))
                .with_clock(clock.clone()),
        );
        Self {
            clock,
            store,
            remote,
            engine,
        }
    }

    async fn sync(&self, scope: OwnerScope) -> SyncSummary {
        self.engine.run_sync_pass(scope).await
    }

    fn create(&self, scope: OwnerScope, title: &str) -> RecordId {
        self.store
            .upsert(SyncableRecord::new(scope, Task::new(title)), WriteOrigin::Local)
            .unwrap()
            .id
    }

    fn rename(&self, id: RecordId, title: &str) {
        let mut record = self.store.get(Collection::Tasks, id).unwrap().unwrap();
        record.body.as_task_mut().unwrap().title = title.into();
        self.store.upsert(record, WriteOrigin::Local).unwrap();
    }

    fn title(&self, id: RecordId) -> Option<String> {
        self.store
            .get(Collection::Tasks, id)
            .unwrap()
            .and_then(|r| r.as_task().map(|t| t.title.clone()))
    }

    fn feed(&self) -> Arc<dyn ChangeFeed> {
        Arc::new(self.remote.clone())
    }
}

fn setup(start: u64) -> (Arc<ManualClock>, Arc<RemoteService>, Session) {
    let clock = Arc::new(ManualClock::new(start));
    let service = Arc::new(RemoteService::with_clock(
        ServiceConfig::default(),
        clock.clone(),
    ));
    (clock, service, Session::new(Uuid::new_v4()))
}

fn remote_title(service: &RemoteService, id: RecordId) -> Option<String> {
    service
        .record(Collection::Tasks, id)
        .unwrap()
        .and_then(|r| r.as_task().map(|t| t.title.clone()))
}

#[tokio::test]
async fn newer_offline_edit_wins_across_devices() {
    let (server_clock, service, session) = setup(101);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 100);
    let b = Device::new(&service, session, 100);

    let t1 = a.create(scope, "Buy food");
    let summary = a.sync(scope).await;
    assert_eq!(summary.pushed, 1);
    let meta = a.store.lookup(Collection::Tasks, t1).unwrap().unwrap().meta;
    assert_eq!(meta.synced_at, Some(Timestamp(101)));

    let summary = b.sync(scope).await;
    assert_eq!(summary.pulled, 1);
    let meta = b.store.lookup(Collection::Tasks, t1).unwrap().unwrap().meta;
    assert_eq!(meta.synced_at, Some(Timestamp(101)));

    // B edits while offline.
    b.clock.set(150);
    b.rename(t1, "Buy dog food");

    a.clock.set(140);
    a.rename(t1, "Buy cat food");
    server_clock.set(141);
    a.sync(scope).await;
    assert_eq!(service.row(Collection::Tasks, t1).unwrap().updated_at, Timestamp(141));

    server_clock.set(151);
    let summary = b.sync(scope).await;
    assert_eq!(summary.conflicts.len(), 1);
    assert_eq!(summary.conflicts[0].resolution, ConflictResolution::KeepLocal);
    assert_eq!(summary.pushed, 1);
    assert_eq!(remote_title(&service, t1).as_deref(), Some("Buy dog food"));

    a.sync(scope).await;
    assert_eq!(a.title(t1).as_deref(), Some("Buy dog food"));
    assert_eq!(b.title(t1).as_deref(), Some("Buy dog food"));
}

#[tokio::test]
async fn later_edit_wins_even_when_pushed_first() {
    let (server_clock, service, session) = setup(101);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 100);
    let b = Device::new(&service, session, 100);

    let t1 = a.create(scope, "Buy food");
    a.sync(scope).await;
    b.sync(scope).await;

    a.clock.set(140);
    a.rename(t1, "Buy cat food");
    b.clock.set(150);
    b.rename(t1, "Buy dog food");

    // Both edits reach the backend after they were made, the earlier one first.
    server_clock.set(160);
    a.sync(scope).await;
    let row = service.row(Collection::Tasks, t1).unwrap();
    assert_eq!(row.updated_at, Timestamp(160));
    assert_eq!(row.edited_at, Some(Timestamp(140)));

    server_clock.set(170);
    let summary = b.sync(scope).await;
    assert_eq!(summary.conflicts.len(), 1);
    assert_eq!(summary.conflicts[0].remote_edited_at, Timestamp(140));
    assert_eq!(summary.conflicts[0].resolution, ConflictResolution::KeepLocal);
    assert_eq!(summary.pushed, 1);

    a.sync(scope).await;
    assert_eq!(a.title(t1).as_deref(), Some("Buy dog food"));
    assert_eq!(b.title(t1).as_deref(), Some("Buy dog food"));
    assert_eq!(remote_title(&service, t1).as_deref(), Some("Buy dog food"));
    assert_eq!(
        service.row(Collection::Tasks, t1).unwrap().edited_at,
        Some(Timestamp(150))
    );
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let (_clock, service, session) = setup(10);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 5);
    let b = Device::new(&service, session, 5);

    a.create(scope, "one");
    a.create(scope, "two");
    a.sync(scope).await;
    b.sync(scope).await;

    for device in [&a, &b] {
        let summary = device.sync(scope).await;
        assert!(!summary.made_progress());
        assert!(summary.conflicts.is_empty());
        assert!(!summary.has_errors());
    }
}

#[tokio::test]
async fn concurrent_edits_converge_in_either_order() {
    for a_first in [true, false] {
        let (clock, service, session) = setup(1_000);
        let scope = session.personal_scope();
        let a = Device::new(&service, session.clone(), 1_000);
        let b = Device::new(&service, session, 1_000);

        let id = a.create(scope, "draft");
        a.sync(scope).await;
        b.sync(scope).await;

        a.clock.set(2_000);
        a.rename(id, "from a");
        b.clock.set(3_000);
        b.rename(id, "from b");
        // The backend stamps both pushes after both edits were made.
        clock.set(5_000);

        let (first, second) = if a_first { (&a, &b) } else { (&b, &a) };
        first.sync(scope).await;
        second.sync(scope).await;
        first.sync(scope).await;

        assert_eq!(a.title(id).as_deref(), Some("from b"), "a_first = {a_first}");
        assert_eq!(b.title(id).as_deref(), Some("from b"), "a_first = {a_first}");
        assert_eq!(remote_title(&service, id).as_deref(), Some("from b"));
        assert!(a.store.pending(Collection::Tasks, scope).unwrap().is_empty());
        assert!(b.store.pending(Collection::Tasks, scope).unwrap().is_empty());
    }
}

#[tokio::test]
async fn edits_to_different_records_are_never_lost() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 1);
    let b = Device::new(&service, session, 1);

    let from_a = a.create(scope, "written on a");
    let from_b = b.create(scope, "written on b");

    a.sync(scope).await;
    b.sync(scope).await;
    a.sync(scope).await;

    for device in [&a, &b] {
        assert_eq!(device.title(from_a).as_deref(), Some("written on a"));
        assert_eq!(device.title(from_b).as_deref(), Some("written on b"));
    }
    assert_eq!(service.row_count(Collection::Tasks), 2);
}

#[tokio::test]
async fn deletion_beats_a_newer_concurrent_edit() {
    let (_clock, service, session) = setup(10);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 10);
    let b = Device::new(&service, session, 10);

    let id = a.create(scope, "doomed");
    a.sync(scope).await;
    b.sync(scope).await;

    b.clock.set(500);
    b.store.delete(Collection::Tasks, id).unwrap();
    b.sync(scope).await;
    assert!(service.row(Collection::Tasks, id).unwrap().is_deleted());

    // A's edit is newer than the deletion but still loses.
    a.clock.set(10_000);
    a.rename(id, "still wanted");
    let summary = a.sync(scope).await;

    assert_eq!(summary.conflicts.len(), 1);
    assert_eq!(summary.conflicts[0].resolution, ConflictResolution::ApplyTombstone);
    assert_eq!(a.title(id), None);
    assert!(a.store.lookup(Collection::Tasks, id).unwrap().unwrap().is_deleted());
    assert!(a.store.pending(Collection::Tasks, scope).unwrap().is_empty());
    assert!(service.row(Collection::Tasks, id).unwrap().is_deleted());
}

#[tokio::test]
async fn never_synced_deletion_leaves_no_remote_row() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);

    let id = a.create(scope, "scratch");
    a.store.delete(Collection::Tasks, id).unwrap();
    let summary = a.sync(scope).await;

    assert!(!summary.has_errors());
    assert_eq!(service.row_count(Collection::Tasks), 0);
    assert!(a.store.pending(Collection::Tasks, scope).unwrap().is_empty());
}

#[tokio::test]
async fn cycles_are_rejected_on_every_device() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 1);
    let b = Device::new(&service, session, 1);

    let t1 = a.create(scope, "design");
    let t2 = a.create(scope, "build");
    tasks::add_blocker(a.store.as_ref(), t2, t1).unwrap();

    let err = tasks::add_blocker(a.store.as_ref(), t1, t2).unwrap_err();
    assert!(err.is_validation());
    let stored = a.store.get(Collection::Tasks, t1).unwrap().unwrap();
    assert!(stored.as_task().unwrap().blocked_by.is_empty());

    a.sync(scope).await;
    b.sync(scope).await;
    let err = tasks::add_blocker(b.store.as_ref(), t1, t2).unwrap_err();
    assert!(err.is_validation());
    assert!(b.store.pending(Collection::Tasks, scope).unwrap().is_empty());
}

#[tokio::test]
async fn offline_pass_keeps_changes_pending() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);

    a.create(scope, "queued");
    service.set_online(false);
    let summary = a.sync(scope).await;
    assert_eq!(summary.errors.len(), 3);
    assert!(summary.errors.iter().all(|e| e.kind.is_retryable()));
    assert!(!summary.is_fatal());
    assert_eq!(a.store.pending(Collection::Tasks, scope).unwrap().len(), 1);
    assert_eq!(a.engine.status().error, None);

    service.set_online(true);
    let summary = a.sync(scope).await;
    assert_eq!(summary.pushed, 1);
    assert!(a.engine.status().last_synced_at.is_some());
}

#[tokio::test]
async fn revoked_session_surfaces_an_error() {
    let (_clock, service, session) = setup(1);
    let user = session.user;
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);

    service.revoke(user);
    let summary = a.sync(scope).await;
    assert!(summary.is_fatal());
    assert!(a.engine.status().error.is_some());

    service.restore(user);
    let summary = a.sync(scope).await;
    assert!(!summary.has_errors());
    assert_eq!(a.engine.status().error, None);
}

#[tokio::test]
async fn foreign_scope_is_unauthorized() {
    let (_clock, service, session) = setup(1);
    let a = Device::new(&service, session, 1);

    let summary = a.sync(OwnerScope::Team(Uuid::new_v4())).await;
    assert!(summary.is_fatal());
}

fn quiet_scheduler() -> SchedulerConfig {
    SchedulerConfig::default().with_backoff(BackoffConfig::new(Duration::from_secs(1)).without_jitter())
}

#[tokio::test(start_paused = true)]
async fn bursts_of_triggers_coalesce_into_one_pass() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);
    let handle = SyncScheduler::new(Arc::clone(&a.engine), quiet_scheduler()).spawn(scope);

    for i in 0..10 {
        a.create(scope, &format!("task {i}"));
        handle.trigger(TriggerReason::LocalChange).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    let state = handle.state();
    assert_eq!(state.passes, 1);
    assert_eq!(state.phase, SchedulerPhase::Idle);
    assert_eq!(a.engine.stats().passes, 1);
    assert_eq!(handle.last_summary().unwrap().pushed, 10);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_passes_back_off_and_recover() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);
    a.create(scope, "queued");
    let handle = SyncScheduler::new(Arc::clone(&a.engine), quiet_scheduler()).spawn(scope);

    service.set_online(false);
    handle.trigger_sync().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let state = handle.state();
    assert_eq!(state.passes, 1);
    assert_eq!(state.phase, SchedulerPhase::Backoff);
    assert_eq!(state.consecutive_failures, 1);

    service.set_online(true);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let state = handle.state();
    assert!(state.passes >= 2);
    assert_eq!(state.phase, SchedulerPhase::Idle);
    assert_eq!(state.consecutive_failures, 0);
    assert!(a.store.pending(Collection::Tasks, scope).unwrap().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unauthorized_pass_is_not_retried() {
    let (_clock, service, session) = setup(1);
    let user = session.user;
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);
    let handle = SyncScheduler::new(Arc::clone(&a.engine), quiet_scheduler()).spawn(scope);

    service.revoke(user);
    handle.trigger_sync().unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    let state = handle.state();
    assert_eq!(state.passes, 1);
    assert_eq!(state.phase, SchedulerPhase::Idle);
    assert!(handle.status().error.is_some());
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn realtime_notice_pulls_on_other_device() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session.clone(), 1);
    let b = Device::new(&service, session, 1);

    let a_handle = SyncScheduler::new(Arc::clone(&a.engine), quiet_scheduler()).spawn(scope);
    let b_handle = SyncScheduler::new(Arc::clone(&b.engine), quiet_scheduler())
        .with_change_feed(b.feed())
        .spawn(scope);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.subscriber_count(), 3);

    let id = a.create(scope, "ping");
    a_handle.trigger(TriggerReason::LocalChange).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(b.title(id).as_deref(), Some("ping"));
    assert!(b_handle.state().passes >= 1);

    a_handle.shutdown().await.unwrap();
    b_handle.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn switching_scope_moves_subscriptions_and_syncs() {
    let (_clock, service, session) = setup(1);
    let team = Uuid::new_v4();
    let session = session.with_team(team);
    let personal = session.personal_scope();
    let shared = OwnerScope::Team(team);
    let a = Device::new(&service, session.clone(), 1);
    let b = Device::new(&service, session, 1);

    let handle = SyncScheduler::new(Arc::clone(&a.engine), quiet_scheduler())
        .with_change_feed(a.feed())
        .spawn(personal);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.subscriber_count(), 3);

    let ours = a.create(shared, "ours");
    handle.set_scope(shared).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let state = handle.state();
    assert_eq!(state.scope, shared);
    assert_eq!(state.phase, SchedulerPhase::Idle);
    assert!(state.passes >= 1);
    assert_eq!(remote_title(&service, ours).as_deref(), Some("ours"));
    assert_eq!(service.subscriber_count(), 3);

    // Changes in the old scope no longer wake the scheduler.
    let passes = state.passes;
    let theirs = b.create(personal, "theirs");
    b.sync(personal).await;
    assert_eq!(remote_title(&service, theirs).as_deref(), Some("theirs"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(handle.state().passes, passes);
    assert_eq!(a.title(theirs), None);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stopped_scheduler_rejects_triggers() {
    let (_clock, service, session) = setup(1);
    let scope = session.personal_scope();
    let a = Device::new(&service, session, 1);
    let handle = SyncScheduler::new(Arc::clone(&a.engine), quiet_scheduler()).spawn(scope);

    handle.shutdown().await.unwrap();
    assert!(handle.trigger_sync().is_err());
    assert!(handle.shutdown().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn coordinator_follows_active_scopes() {
    let (_clock, service, session) = setup(1);
    let team = Uuid::new_v4();
    let session = session.with_team(team);
    let personal = session.personal_scope();
    let shared = OwnerScope::Team(team);
    let a = Device::new(&service, session, 1);

    a.create(personal, "mine");
    a.create(shared, "ours");

    let mut coordinator = SyncCoordinator::new(Arc::clone(&a.engine), quiet_scheduler())
        .with_change_feed(a.feed());
    coordinator.set_active_scopes([personal, shared]).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(coordinator.active_scopes().len(), 2);
    assert_eq!(service.row_count(Collection::Tasks), 2);
    // Echoed notices of its own pushes may add a pass.
    assert!(coordinator.handle(shared).unwrap().state().passes >= 1);
    assert_eq!(a.engine.locked_scopes(), 2);

    coordinator.set_active_scopes([personal]).await;
    assert!(coordinator.handle(shared).is_none());
    assert_eq!(coordinator.active_scopes(), vec![personal]);
    assert_eq!(a.engine.locked_scopes(), 1);

    coordinator.trigger_all(TriggerReason::Resumed);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(coordinator.handle(personal).unwrap().state().passes >= 2);
    coordinator.shutdown().await;
}

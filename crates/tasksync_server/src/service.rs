//! The hosted backend.

use crate::auth::Session;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::handler::RemoteSession;
use crate::table::Tables;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tasksync_core::{
    Clock, Collection, OwnerScope, RecordId, SyncableRecord, SystemClock, Timestamp,
};
use tasksync_protocol::{ChangeNotice, ChangeType, Subscription, WireError, WireRow};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

/// The shared backend every device talks to.
///
/// Holds one table per collection and a realtime feed. Devices reach it
/// through a [`RemoteSession`] obtained from [`RemoteService::connect`].
///
/// # Fault injection
///
/// - [`RemoteService::set_online`] makes every call fail with
///   `NetworkUnavailable` until restored
/// - [`RemoteService::revoke`] invalidates a user's sessions so every call
///   fails with `Unauthorized`
pub struct RemoteService {
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    tables: RwLock<Tables>,
    feed: broadcast::Sender<ChangeNotice>,
    online: AtomicBool,
    revoked: RwLock<HashSet<Uuid>>,
}

impl RemoteService {
    /// Creates a service stamping rows with the wall clock.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a service with an injected clock.
    pub fn with_clock(config: ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        let (feed, _) = broadcast::channel(config.feed_capacity.max(1));
        Self {
            config,
            clock,
            tables: RwLock::new(Tables::default()),
            feed,
            online: AtomicBool::new(true),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    /// Opens a session-bound handle implementing the remote contract.
    pub fn connect(self: &Arc<Self>, session: Session) -> RemoteSession {
        RemoteSession::new(Arc::clone(self), session)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Takes the service offline or brings it back.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        debug!(online, "service connectivity changed");
    }

    /// Returns true if the service accepts calls.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Invalidates every session of `user`.
    pub fn revoke(&self, user: Uuid) {
        self.revoked.write().insert(user);
    }

    /// Re-validates sessions of `user`.
    pub fn restore(&self, user: Uuid) {
        self.revoked.write().remove(&user);
    }

    /// Returns the stored row, tombstones included.
    pub fn row(&self, collection: Collection, id: RecordId) -> Option<WireRow> {
        self.tables.read().get(collection, id).cloned()
    }

    /// Returns the stored row decoded as a record.
    pub fn record(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> ServiceResult<Option<SyncableRecord>> {
        self.row(collection, id)
            .map(|row| row.into_record(collection))
            .transpose()
            .map_err(ServiceError::from)
    }

    /// Returns the number of rows in a table, tombstones included.
    pub fn row_count(&self, collection: Collection) -> usize {
        self.tables.read().len(collection)
    }

    /// Returns the number of live realtime subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.feed.receiver_count()
    }

    /// Writes a raw row as another client would, bypassing sessions.
    ///
    /// Rows may use legacy column spellings; they are stored as given and
    /// normalized when read.
    pub fn import_row(&self, collection: Collection, row: WireRow) -> ServiceResult<Timestamp> {
        let scope = row.scope;
        let (ts, change) = self.tables.write().upsert(collection, row, self.clock.now())?;
        self.notify(ChangeNotice::new(collection, scope, change));
        Ok(ts)
    }

    fn check_session(&self, session: &Session) -> ServiceResult<()> {
        if !self.is_online() {
            return Err(ServiceError::Offline);
        }
        if self.revoked.read().contains(&session.user) {
            return Err(ServiceError::SessionRevoked(session.user));
        }
        Ok(())
    }

    pub(crate) fn upsert(
        &self,
        session: &Session,
        collection: Collection,
        record: &SyncableRecord,
    ) -> ServiceResult<Timestamp> {
        self.check_session(session)?;
        session.authorize(record.scope)?;
        if record.collection() != collection {
            return Err(WireError::InvalidRow {
                collection,
                id: record.id,
                message: format!("record belongs to {}", record.collection()),
            }
            .into());
        }

        let row = WireRow::from_record(record)?;
        let (ts, change) = self.tables.write().upsert(collection, row, self.clock.now())?;
        debug!(%collection, id = %record.id, scope = %record.scope, %ts, ?change, "row written");
        self.notify(ChangeNotice::new(collection, record.scope, change));
        Ok(ts)
    }

    pub(crate) fn query(
        &self,
        session: &Session,
        collection: Collection,
        scope: OwnerScope,
        since: Option<Timestamp>,
    ) -> ServiceResult<Vec<SyncableRecord>> {
        self.check_session(session)?;
        session.authorize(scope)?;

        let rows = self.tables.read().since(collection, scope, since);
        trace!(%collection, %scope, ?since, rows = rows.len(), "query");
        rows.into_iter()
            .map(|row| row.into_record(collection).map_err(ServiceError::from))
            .collect()
    }

    pub(crate) fn delete(
        &self,
        session: &Session,
        collection: Collection,
        scope: OwnerScope,
        id: RecordId,
    ) -> ServiceResult<Timestamp> {
        self.check_session(session)?;
        session.authorize(scope)?;

        let (ts, stored) = self
            .tables
            .write()
            .delete(collection, scope, id, self.clock.now())?;
        debug!(%collection, %id, %scope, %ts, stored, "row deleted");
        if stored {
            self.notify(ChangeNotice::new(collection, scope, ChangeType::Delete));
        }
        Ok(ts)
    }

    pub(crate) fn subscribe(
        &self,
        session: &Session,
        collection: Collection,
        scope: OwnerScope,
    ) -> ServiceResult<Subscription> {
        self.check_session(session)?;
        session.authorize(scope)?;
        debug!(%collection, %scope, user = %session.user, "subscribed");
        Ok(Subscription::new(collection, scope, self.feed.subscribe()))
    }

    fn notify(&self, notice: ChangeNotice) {
        // No subscribers is not an error.
        let _ = self.feed.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tasksync_core::{ManualClock, Task};

    fn service() -> (RemoteService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(100));
        let service = RemoteService::with_clock(ServiceConfig::default(), clock.clone());
        (service, clock)
    }

    #[test]
    fn upsert_then_query() {
        let (service, clock) = service();
        let session = Session::new(Uuid::new_v4());
        let scope = session.personal_scope();
        let record = SyncableRecord::new(scope, Task::new("Buy food"));

        clock.set(101);
        let ts = service.upsert(&session, Collection::Tasks, &record).unwrap();
        assert_eq!(ts, Timestamp(101));

        let rows = service.query(&session, Collection::Tasks, scope, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].meta.remote_updated_at, Some(Timestamp(101)));
        assert_eq!(rows[0].as_task().unwrap().title, "Buy food");
        assert!(service
            .query(&session, Collection::Tasks, scope, Some(ts))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn foreign_scope_forbidden() {
        let (service, _) = service();
        let session = Session::new(Uuid::new_v4());
        let foreign = OwnerScope::Team(Uuid::new_v4());
        let record = SyncableRecord::new(foreign, Task::new("x"));

        assert!(matches!(
            service.upsert(&session, Collection::Tasks, &record),
            Err(ServiceError::Forbidden { .. })
        ));
        assert!(service.query(&session, Collection::Tasks, foreign, None).is_err());
    }

    #[test]
    fn offline_and_revoked_sessions_fail() {
        let (service, _) = service();
        let session = Session::new(Uuid::new_v4());
        let scope = session.personal_scope();

        service.set_online(false);
        assert_eq!(
            service.query(&session, Collection::Tasks, scope, None),
            Err(ServiceError::Offline)
        );
        service.set_online(true);

        service.revoke(session.user);
        assert_eq!(
            service.query(&session, Collection::Tasks, scope, None),
            Err(ServiceError::SessionRevoked(session.user))
        );
        service.restore(session.user);
        assert!(service.query(&session, Collection::Tasks, scope, None).is_ok());
    }

    #[test]
    fn collection_mismatch_rejected() {
        let (service, _) = service();
        let session = Session::new(Uuid::new_v4());
        let record = SyncableRecord::new(session.personal_scope(), Task::new("x"));
        assert!(matches!(
            service.upsert(&session, Collection::Labels, &record),
            Err(ServiceError::Wire(_))
        ));
    }

    #[test]
    fn legacy_rows_are_normalized_on_read() {
        let (service, _) = service();
        let session = Session::new(Uuid::new_v4());
        let scope = session.personal_scope();
        let id = RecordId::new();

        let row: WireRow = serde_json::from_value(json!({
            "id": id,
            "scope": scope,
            "updatedAt": 0,
            "name": "Home",
            "isArchived": true,
        }))
        .unwrap();
        service.import_row(Collection::Projects, row).unwrap();

        let record = service.record(Collection::Projects, id).unwrap().unwrap();
        match record.body {
            tasksync_core::EntityBody::Project(project) => assert!(project.archived),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn writes_emit_notices() {
        let (service, _) = service();
        let session = Session::new(Uuid::new_v4());
        let scope = session.personal_scope();
        let mut sub = service.subscribe(&session, Collection::Tasks, scope).unwrap();
        assert_eq!(service.subscriber_count(), 1);

        let record = SyncableRecord::new(scope, Task::new("x"));
        service.upsert(&session, Collection::Tasks, &record).unwrap();
        service.delete(&session, Collection::Tasks, scope, record.id).unwrap();

        assert_eq!(sub.recv().await.unwrap().change_type, ChangeType::Insert);
        assert_eq!(sub.recv().await.unwrap().change_type, ChangeType::Delete);
    }
}

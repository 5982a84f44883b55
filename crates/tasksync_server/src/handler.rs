//! Session-bound request handling.

use crate::auth::Session;
use crate::service::RemoteService;
use async_trait::async_trait;
use std::sync::Arc;
use tasksync_core::{Collection, OwnerScope, RecordId, SyncableRecord, Timestamp};
use tasksync_protocol::{ChangeFeed, RemoteResult, RemoteStore, Subscription};

/// A device's connection to the service, bound to one session.
///
/// Cheap to clone; clones share the service.
#[derive(Clone)]
pub struct RemoteSession {
    service: Arc<RemoteService>,
    session: Session,
}

impl RemoteSession {
    pub(crate) fn new(service: Arc<RemoteService>, session: Session) -> Self {
        Self { service, session }
    }

    /// Returns the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the service this handle talks to.
    pub fn service(&self) -> &Arc<RemoteService> {
        &self.service
    }

    async fn round_trip(&self) {
        let latency = self.service.config().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteStore for RemoteSession {
    async fn upsert(
        &self,
        collection: Collection,
        record: &SyncableRecord,
    ) -> RemoteResult<Timestamp> {
        self.round_trip().await;
        Ok(self.service.upsert(&self.session, collection, record)?)
    }

    async fn query(
        &self,
        collection: Collection,
        scope: OwnerScope,
        since: Option<Timestamp>,
    ) -> RemoteResult<Vec<SyncableRecord>> {
        self.round_trip().await;
        Ok(self.service.query(&self.session, collection, scope, since)?)
    }

    async fn delete(
        &self,
        collection: Collection,
        scope: OwnerScope,
        id: RecordId,
    ) -> RemoteResult<Timestamp> {
        self.round_trip().await;
        Ok(self.service.delete(&self.session, collection, scope, id)?)
    }
}

impl ChangeFeed for RemoteSession {
    fn subscribe(&self, collection: Collection, scope: OwnerScope) -> RemoteResult<Subscription> {
        Ok(self.service.subscribe(&self.session, collection, scope)?)
    }
}

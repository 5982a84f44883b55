//! Realtime change notices.
//!
//! Notices are hints, never data: a receiver only learns that something in
//! a collection changed, and reacts by running a sync pass. Delivery is
//! best-effort. A subscriber that falls behind gets one notice in place of
//! everything it missed.

use crate::error::RemoteResult;
use serde::{Deserialize, Serialize};
use tasksync_core::{Collection, OwnerScope};
use tokio::sync::broadcast;

/// Type of change behind a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A row was created.
    Insert,
    /// A row was modified.
    Update,
    /// A row was tombstoned.
    Delete,
}

/// Notification that a row in a collection changed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    /// Collection of the changed row.
    pub collection: Collection,
    /// Scope of the changed row.
    pub scope: OwnerScope,
    /// What happened.
    pub change_type: ChangeType,
}

impl ChangeNotice {
    /// Creates a notice.
    pub fn new(collection: Collection, scope: OwnerScope, change_type: ChangeType) -> Self {
        Self {
            collection,
            scope,
            change_type,
        }
    }
}

/// A source of change notices.
pub trait ChangeFeed: Send + Sync {
    /// Subscribes to notices for one collection of one scope.
    ///
    /// Fails with `Unauthorized` when the caller may not read the scope.
    fn subscribe(&self, collection: Collection, scope: OwnerScope) -> RemoteResult<Subscription>;
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    scope: OwnerScope,
    receiver: broadcast::Receiver<ChangeNotice>,
}

impl Subscription {
    /// Wraps a receiver of the backend's notice stream, keeping only
    /// notices for `collection` in `scope`.
    pub fn new(
        collection: Collection,
        scope: OwnerScope,
        receiver: broadcast::Receiver<ChangeNotice>,
    ) -> Self {
        Self {
            collection,
            scope,
            receiver,
        }
    }

    /// Returns the subscribed collection.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Returns the subscribed scope.
    pub fn scope(&self) -> OwnerScope {
        self.scope
    }

    /// Waits for the next matching notice.
    ///
    /// Returns `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.receiver.recv().await {
                Ok(notice) if self.accepts(&notice) => return Some(notice),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some(ChangeNotice::new(
                        self.collection,
                        self.scope,
                        ChangeType::Update,
                    ));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, notice: &ChangeNotice) -> bool {
        notice.collection == self.collection && notice.scope == self.scope
    }
}

//! One scheduler per active scope.

use crate::config::SchedulerConfig;
use crate::engine::SyncEngine;
use crate::scheduler::{SchedulerHandle, SyncScheduler, TriggerReason};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tasksync_core::OwnerScope;
use tasksync_protocol::{ChangeFeed, RemoteStore};
use tasksync_store::LocalStore;
use tracing::{info, warn};

/// Keeps a scheduler running for each scope the user currently works in.
///
/// All schedulers share one engine, so passes for different scopes may run
/// concurrently while passes for the same scope stay serialized.
pub struct SyncCoordinator<L: ?Sized, R: ?Sized> {
    engine: Arc<SyncEngine<L, R>>,
    feed: Option<Arc<dyn ChangeFeed>>,
    config: SchedulerConfig,
    schedulers: HashMap<OwnerScope, SchedulerHandle>,
}

impl<L, R> SyncCoordinator<L, R>
where
    L: LocalStore + ?Sized + 'static,
    R: RemoteStore + ?Sized + 'static,
{
    /// Creates a coordinator with no active scopes.
    pub fn new(engine: Arc<SyncEngine<L, R>>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            feed: None,
            config,
            schedulers: HashMap::new(),
        }
    }

    /// Gives every scheduler a realtime subscription.
    pub fn with_change_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Returns the shared engine.
    pub fn engine(&self) -> &Arc<SyncEngine<L, R>> {
        &self.engine
    }

    /// Starts schedulers for new scopes and stops those no longer listed.
    ///
    /// Newly started scopes get an initial pass.
    pub async fn set_active_scopes(&mut self, scopes: impl IntoIterator<Item = OwnerScope>) {
        let wanted: HashSet<OwnerScope> = scopes.into_iter().collect();

        let stale: Vec<OwnerScope> = self
            .schedulers
            .keys()
            .filter(|scope| !wanted.contains(scope))
            .copied()
            .collect();
        for scope in stale {
            if let Some(handle) = self.schedulers.remove(&scope) {
                if let Err(e) = handle.shutdown().await {
                    warn!(%scope, error = %e, "scheduler did not stop cleanly");
                }
                self.engine.release_scope(scope);
                info!(%scope, "scope deactivated");
            }
        }

        for scope in wanted {
            if self.schedulers.contains_key(&scope) {
                continue;
            }
            let mut scheduler = SyncScheduler::new(Arc::clone(&self.engine), self.config.clone());
            if let Some(feed) = &self.feed {
                scheduler = scheduler.with_change_feed(Arc::clone(feed));
            }
            let handle = scheduler.spawn(scope);
            if let Err(e) = handle.trigger(TriggerReason::Startup) {
                warn!(%scope, error = %e, "initial sync trigger failed");
            }
            info!(%scope, "scope activated");
            self.schedulers.insert(scope, handle);
        }
    }

    /// Returns the scheduler for `scope`, if active.
    pub fn handle(&self, scope: OwnerScope) -> Option<&SchedulerHandle> {
        self.schedulers.get(&scope)
    }

    /// Returns the active scopes.
    pub fn active_scopes(&self) -> Vec<OwnerScope> {
        self.schedulers.keys().copied().collect()
    }

    /// Triggers every active scheduler.
    pub fn trigger_all(&self, reason: TriggerReason) {
        for (scope, handle) in &self.schedulers {
            if let Err(e) = handle.trigger(reason) {
                warn!(%scope, error = %e, "sync trigger failed");
            }
        }
    }

    /// Stops every scheduler.
    pub async fn shutdown(mut self) {
        for (scope, handle) in self.schedulers.drain() {
            if let Err(e) = handle.shutdown().await {
                warn!(%scope, error = %e, "scheduler did not stop cleanly");
            }
        }
    }
}

impl<L: ?Sized, R: ?Sized> std::fmt::Debug for SyncCoordinator<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("scopes", &self.schedulers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

//! CLI command implementations.

pub mod coalesce;
pub mod scenario;

use std::sync::Arc;
use tasksync_core::ManualClock;
use tasksync_engine::{SyncConfig, SyncEngine};
use tasksync_server::{RemoteService, RemoteSession, Session};
use tasksync_store::MemoryLocalStore;

/// A simulated device.
pub struct Device {
    /// Device clock.
    pub clock: Arc<ManualClock>,
    /// Device store.
    pub store: Arc<MemoryLocalStore>,
    /// Device engine.
    pub engine: Arc<SyncEngine<MemoryLocalStore, RemoteSession>>,
}

impl Device {
    /// Connects a new device reading `start` on its clock.
    pub fn connect(service: &Arc<RemoteService>, session: Session, start: u64) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryLocalStore::with_clock(clock.clone()));
        let engine = Arc::new(
            SyncEngine::new(
                SyncConfig::default(),
                Arc::clone(&store),
                Arc::new(service.connect(session)),
            )
            .with_clock(clock.clone()),
        );
        Self {
            clock,
            store,
            engine,
        }
    }
}

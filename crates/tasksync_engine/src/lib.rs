//! # tasksync sync engine
//!
//! Keeps a device's local store and the hosted backend in agreement.
//!
//! This crate provides:
//! - [`SyncEngine`], which runs pull-then-push passes for one owner scope
//! - Last-writer-wins conflict resolution with tombstones that always win
//! - Per-scope pull watermarks, advanced only after every row applied
//! - [`SyncScheduler`], which coalesces triggers, spaces passes and backs
//!   off after failures
//! - [`SyncCoordinator`], which keeps one scheduler per active scope
//!
//! ## Architecture
//!
//! ```text
//!   triggers ──► SyncScheduler ──► SyncEngine::run_sync_pass(scope)
//!   (manual,        (debounce,        │ pull: query since watermark,
//!    local writes,   min interval,    │       resolve, apply, advance
//!    change feed)    backoff)         │ push: upsert / delete pending,
//!                                     ▼       acknowledge
//!                             LocalStore ◄──► RemoteStore
//! ```
//!
//! ## Key Invariants
//!
//! - Pull always precedes push within a pass
//! - At most one pass per scope runs at a time
//! - A pass never raises; failures are accumulated in [`SyncSummary`]
//! - A pass with nothing changed on either side makes no writes
//! - Every remote call is bounded by [`SyncConfig::request_timeout`]

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod coordinator;
mod engine;
mod error;
mod scheduler;
mod state;

pub use config::{BackoffConfig, SchedulerConfig, SyncConfig};
pub use coordinator::SyncCoordinator;
pub use engine::SyncEngine;
pub use error::{RecordError, SyncError, SyncErrorKind, SyncPhase, SyncResult};
pub use scheduler::{
    PassOutcome, SchedulerCore, SchedulerHandle, SchedulerPhase, SchedulerState, SyncScheduler,
    TriggerReason,
};
pub use state::{SyncState, SyncStats, SyncStatus, SyncSummary};

//! # tasksync store
//!
//! Per-device local datastore for tasksync.
//!
//! This crate provides the [`LocalStore`] contract the sync engine and the
//! presentation layer both talk to, and [`MemoryLocalStore`], an in-memory
//! implementation used by tests and simulations.
//!
//! ## Design Principles
//!
//! - Writes are visible to the next read on the same device immediately
//! - Deletes leave tombstones; rows are never physically removed
//! - Local writes bump `local_updated_at`; writes applied by a pull keep
//!   the sync metadata the engine supplies
//! - Blocked-by cycles are rejected before anything is written
//!
//! ## Example
//!
//! ```rust
//! use tasksync_core::{Collection, OwnerScope, SyncableRecord, Task};
//! use tasksync_store::{LocalStore, MemoryLocalStore, RecordFilter, WriteOrigin};
//!
//! let store = MemoryLocalStore::new();
//! let scope = OwnerScope::User(Default::default());
//! let task = SyncableRecord::new(scope, Task::new("Buy food"));
//! store.upsert(task, WriteOrigin::Local).unwrap();
//!
//! let tasks = store.query(Collection::Tasks, &RecordFilter::scope(scope)).unwrap();
//! assert_eq!(tasks.len(), 1);
//! assert!(tasks[0].is_dirty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod filter;
mod memory;
mod store;
pub mod tasks;

pub use error::{StoreError, StoreResult};
pub use filter::RecordFilter;
pub use memory::MemoryLocalStore;
pub use store::{LocalStore, WriteOrigin};

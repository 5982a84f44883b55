//! # tasksync core
//!
//! Record model shared by every tasksync component.
//!
//! This crate provides:
//! - `RecordId`, `OwnerScope`, `Collection` and `Timestamp`
//! - `SyncableRecord` with its per-row `SyncMeta`
//! - Entity schemas for projects, tasks and labels
//! - The blocked-by `DependencyGraph` with cycle detection
//! - Injectable clocks
//!
//! This crate performs no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod entity;
mod error;
mod graph;
mod id;
mod record;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{EntityBody, Label, Priority, Project, Task, TaskStatus};
pub use error::{CoreError, CoreResult, ValidationError};
pub use graph::DependencyGraph;
pub use id::RecordId;
pub use record::{SyncMeta, SyncableRecord};
pub use types::{Collection, OwnerScope, Timestamp};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

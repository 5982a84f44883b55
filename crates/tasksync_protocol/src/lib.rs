//! # tasksync protocol
//!
//! The contract between a device and the hosted backend.
//!
//! This crate provides:
//! - [`RemoteStore`], the async remote datastore contract
//! - [`ChangeFeed`] and [`ChangeNotice`] for realtime hints
//! - [`WireRow`], the table-row mapping adapter
//! - The last-writer-wins conflict rule
//!
//! This is a pure contract crate with no I/O of its own.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod conflict;
mod error;
mod remote;
mod wire;

pub use change_feed::{ChangeFeed, ChangeNotice, ChangeType, Subscription};
pub use conflict::{resolve_conflict, Conflict, ConflictResolution};
pub use error::{ConflictReason, RemoteError, RemoteResult, WireError};
pub use remote::RemoteStore;
pub use wire::WireRow;

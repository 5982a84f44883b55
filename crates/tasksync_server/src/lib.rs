//! # tasksync server
//!
//! In-process hosted backend for tasksync.
//!
//! This crate provides:
//! - One table of wire rows per collection, keyed by id
//! - A server-maintained `updated_at` that strictly increases across the
//!   whole service
//! - Per-session scope authorization
//! - A realtime broadcast feed of change notices
//! - Fault injection for offline and revoked-session testing
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tasksync_server::{RemoteService, ServiceConfig, Session};
//! use uuid::Uuid;
//!
//! let service = Arc::new(RemoteService::new(ServiceConfig::default()));
//! let remote = service.connect(Session::new(Uuid::new_v4()));
//! assert!(service.is_online());
//! # let _ = remote;
//! ```
//!
//! Devices never share state with the service except through the
//! [`tasksync_protocol::RemoteStore`] and [`tasksync_protocol::ChangeFeed`]
//! implementations on [`RemoteSession`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod service;
mod table;

pub use auth::Session;
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use handler::RemoteSession;
pub use service::RemoteService;

//! # spendsync server
//!
//! Reference authoritative store for spendsync replicas.
//!
//! This crate provides:
//! - An in-memory [`ExpenseRepository`] with change-stamped records
//! - A [`RequestHandler`] for the JSON endpoints, usable in-process
//! - An axum HTTP front end ([`SyncServer`])
//! - CSV export of live records
//!
//! # Protocol
//!
//! Replicas push their unsynced records to `POST /api/expenses/sync` and
//! pull with `GET /api/expenses?since=<serverTime>`:
//! 1. A provisional record is created under a fresh server id; resubmitting
//!    it returns the same id
//! 2. An existing record is replaced only by a strictly newer `updatedAt`
//! 3. Deletes are tombstones, and tombstones are returned by pulls
//! 4. `serverTime` is the newest change stamp; passing it back as `since`
//!    returns exactly the later writes

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod repository;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use repository::ExpenseRepository;
pub use server::SyncServer;

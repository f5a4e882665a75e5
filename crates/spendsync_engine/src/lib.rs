//! # spendsync engine
//!
//! Local replica and synchronization orchestrator for spendsync.
//!
//! This crate provides:
//! - [`ReplicaStore`], the device's persisted record set
//! - [`RemoteRepository`], the capability to talk to the authoritative store
//! - [`HttpRepository`] over any [`HttpClient`] ([`ReqwestClient`] in production)
//! - [`SyncEngine`], which runs push → pull → merge → apply cycles
//! - [`SyncScheduler`], the cancellable background task that drives cycles
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** cycle:
//! 1. Snapshot the replica and push every unsynced record as one batch
//! 2. Rebind pushed records to the server's echoes
//! 3. Pull the server's changes since the last watermark
//! 4. Reconcile with last-writer-wins and apply atomically
//!
//! ## Key Invariants
//!
//! - Cycles never overlap; a request during a cycle queues behind it
//! - A failed push or pull leaves local state untouched and flips the
//!   engine offline
//! - Mutations made while a cycle is in flight survive it and are pushed
//!   by the next one
//! - Every mutation is persisted before the call returns

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod replica;
mod scheduler;
mod state;
mod transport;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRepository, HttpResponse, LoopbackClient, LoopbackServer, ReqwestClient};
pub use replica::{DeleteOutcome, ReplicaSnapshot, ReplicaStore};
pub use scheduler::{SyncHandle, SyncScheduler};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use transport::{MockFailure, MockRepository, RemoteRepository};

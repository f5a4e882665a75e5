//! # spendsync storage
//!
//! Key-value blob store abstraction used by the local replica.
//!
//! Stores are **opaque byte stores** keyed by short names. They do not
//! interpret the documents they hold; the replica owns the format.
//!
//! ## Available Backends
//!
//! - [`InMemoryBlobStore`] - For testing and ephemeral replicas
//! - [`FileBlobStore`] - One file per key inside a directory
//!
//! ## Example
//!
//! ```rust
//! use spendsync_storage::{BlobStore, InMemoryBlobStore};
//!
//! let store = InMemoryBlobStore::new();
//! store.put("expenses", b"[]").unwrap();
//! assert_eq!(store.get("expenses").unwrap(), Some(b"[]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, BlobStore};
pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use memory::InMemoryBlobStore;

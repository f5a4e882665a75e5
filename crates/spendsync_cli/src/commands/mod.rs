//! CLI command implementations.

pub mod expense;
pub mod list;
pub mod serve;
pub mod sync;

use spendsync_engine::{
    HttpRepository, RemoteRepository, ReplicaStore, ReqwestClient, SyncConfig, SyncEngine,
};
use spendsync_storage::{BlobStore, FileBlobStore};
use std::path::Path;

/// The engine the CLI drives: a directory replica talking HTTP.
pub type Engine = SyncEngine<HttpRepository<ReqwestClient>, FileBlobStore>;

/// Opens the replica under `path` and connects it to `config.server_url`.
pub fn open_engine(path: &Path, config: SyncConfig) -> Result<Engine, Box<dyn std::error::Error>> {
    let store = FileBlobStore::open(path)?;
    let client = ReqwestClient::new(config.timeout)?;
    let remote = HttpRepository::new(config.server_url.clone(), client);
    Ok(SyncEngine::new(config, remote, ReplicaStore::open(store)))
}

/// Tries one cycle after a local change. Failure only leaves the change
/// queued.
pub async fn sync_after_mutation<R, B>(engine: &SyncEngine<R, B>, offline: bool)
where
    R: RemoteRepository,
    B: BlobStore,
{
    if offline {
        return;
    }
    match engine.synchronize().await {
        Ok(_) => println!("Synced with {}", engine.config().server_url),
        Err(e) => println!(
            "Saved locally; {} change(s) will sync later ({e})",
            engine.pending_count()
        ),
    }
}

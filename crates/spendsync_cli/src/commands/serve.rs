//! Serve command implementation.

use spendsync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;

/// Runs the reference server until Ctrl-C.
pub async fn run(bind: SocketAddr, max_push_batch: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::new(bind).with_max_push_batch(max_push_batch);
    SyncServer::new(config)
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

//! Sync, status and watch commands.

use chrono::{DateTime, Utc};
use serde::Serialize;
use spendsync_engine::{RemoteRepository, SyncCycleResult, SyncEngine, SyncScheduler};
use spendsync_storage::BlobStore;
use std::sync::Arc;
use tracing::info;

/// Replica state, as printed by `status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Server the replica syncs with.
    pub server: String,
    /// Visible records.
    pub records: usize,
    /// Records waiting to be pushed.
    pub pending: usize,
    /// Watermark of the last successful sync.
    pub last_synced: Option<DateTime<Utc>>,
}

/// Runs one cycle and reports its outcome. A failed cycle is an error.
pub async fn run<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
) -> Result<SyncCycleResult, Box<dyn std::error::Error>> {
    let result = engine.synchronize().await?;
    println!(
        "Sync complete: pushed {}, pulled {}, {} new from server ({} ms)",
        result.pushed,
        result.pulled,
        result.report.adopted_remote,
        result.duration.as_millis()
    );
    Ok(result)
}

/// Collects the status report.
pub fn report<R: RemoteRepository, B: BlobStore>(engine: &SyncEngine<R, B>) -> StatusReport {
    StatusReport {
        server: engine.config().server_url.clone(),
        records: engine.expenses().len(),
        pending: engine.pending_count(),
        last_synced: engine.last_synced(),
    }
}

/// Runs the status command.
pub fn status<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = report(engine);
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("Server:      {}", report.server);
            println!("Expenses:    {}", report.records);
            println!("Pending:     {}", report.pending);
            match report.last_synced {
                Some(at) => println!("Last synced: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Last synced: never"),
            }
        }
    }
    Ok(())
}

/// Syncs on the configured interval until Ctrl-C.
pub async fn watch<R, B>(engine: SyncEngine<R, B>) -> Result<(), Box<dyn std::error::Error>>
where
    R: RemoteRepository + 'static,
    B: BlobStore + 'static,
{
    let engine = Arc::new(engine);
    let handle = SyncScheduler::start(Arc::clone(&engine));
    info!(
        server = %engine.config().server_url,
        interval_secs = engine.config().sync_interval.as_secs(),
        "watching, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;

    let stats = engine.stats();
    println!(
        "Stopped after {} cycle(s), {} failed; {} change(s) pending",
        stats.cycles_completed,
        stats.failures,
        engine.pending_count()
    );
    Ok(())
}

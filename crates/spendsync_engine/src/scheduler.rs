//! Background sync scheduling.
//!
//! [`SyncScheduler::start`] spawns a task that owns the timer and funnels
//! every trigger into [`SyncEngine::synchronize`]:
//!
//! - once at startup (when [`SyncConfig::initial_sync`] is set)
//! - on every interval tick
//! - after a mutation made while online
//! - when connectivity is reported back
//! - on explicit request via [`SyncHandle::sync_now`]
//!
//! Failures are logged by the engine and never stop the loop.
//!
//! [`SyncConfig::initial_sync`]: crate::SyncConfig::initial_sync

use crate::error::{SyncError, SyncResult};
use crate::state::{SyncCycleResult, SyncEngine};
use crate::transport::RemoteRepository;
use spendsync_storage::BlobStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Commands accepted by the background task.
enum SyncCommand {
    /// Run a cycle, result discarded.
    Trigger,
    /// Run a cycle and report its result.
    SyncNow(oneshot::Sender<SyncResult<SyncCycleResult>>),
    /// Stop the loop.
    Stop,
}

/// Starts background synchronization for an engine.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawns the background task on the current tokio runtime.
    pub fn start<R, B>(engine: Arc<SyncEngine<R, B>>) -> SyncHandle
    where
        R: RemoteRepository + 'static,
        B: BlobStore + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run(engine, rx));
        SyncHandle {
            commands: tx,
            task: Some(task),
        }
    }
}

async fn run<R, B>(engine: Arc<SyncEngine<R, B>>, mut commands: mpsc::Receiver<SyncCommand>)
where
    R: RemoteRepository + 'static,
    B: BlobStore + 'static,
{
    let period = engine.config().sync_interval;
    info!(interval_secs = period.as_secs(), "sync scheduler started");

    if engine.config().initial_sync {
        let _ = engine.synchronize().await;
    }

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("interval sync");
                let _ = engine.synchronize().await;
            }
            _ = engine.mutation_signal() => {
                debug!("mutation sync");
                let _ = engine.synchronize().await;
            }
            command = commands.recv() => match command {
                Some(SyncCommand::Trigger) => {
                    debug!("triggered sync");
                    let _ = engine.synchronize().await;
                }
                Some(SyncCommand::SyncNow(reply)) => {
                    let _ = reply.send(engine.synchronize().await);
                }
                Some(SyncCommand::Stop) | None => break,
            },
        }
    }
    info!("sync scheduler stopped");
}

/// Handle to a running scheduler.
///
/// Dropping the handle aborts the task; [`SyncHandle::shutdown`] stops it
/// after any in-flight cycle completes.
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Requests a cycle without waiting for it.
    ///
    /// Dropped silently if the command queue is full, since a queued cycle
    /// will pick up the same state.
    pub fn trigger(&self) {
        let _ = self.commands.try_send(SyncCommand::Trigger);
    }

    /// Runs a cycle and returns its result.
    pub async fn sync_now(&self) -> SyncResult<SyncCycleResult> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::SyncNow(tx))
            .await
            .map_err(|_| SyncError::ShutDown)?;
        rx.await.map_err(|_| SyncError::Cancelled)?
    }

    /// Reports a connectivity change observed by the host.
    ///
    /// Regaining connectivity triggers a cycle. The engine's own online flag
    /// is still only set by a successful cycle.
    pub fn notify_connectivity<R, B>(&self, engine: &SyncEngine<R, B>, online: bool)
    where
        R: RemoteRepository,
        B: BlobStore,
    {
        if online {
            self.trigger();
        } else {
            engine.mark_offline();
        }
    }

    /// Returns true while the background task is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(SyncCommand::Stop).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

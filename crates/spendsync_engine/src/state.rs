//! Sync orchestrator.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::replica::{DeleteOutcome, ReplicaStore};
use crate::transport::RemoteRepository;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use spendsync_protocol::{
    reconcile_with_report, Category, Expense, ExpenseId, ExpensePatch, MergeReport, NewExpense,
    ProvisionalToken, ServerId,
};
use spendsync_storage::BlobStore;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// The current phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Sending unsynced records.
    Pushing,
    /// Fetching server changes.
    Pulling,
    /// Reconciling and applying.
    Merging,
    /// The last cycle succeeded.
    Synced,
    /// The last cycle could not reach the server.
    Offline,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pushing | SyncState::Pulling | SyncState::Merging
        )
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of cycles completed.
    pub cycles_completed: u64,
    /// Total number of records pushed.
    pub records_pushed: u64,
    /// Total number of records pulled.
    pub records_pulled: u64,
    /// Identities present on both sides during merges.
    pub conflicts_resolved: u64,
    /// Total number of failed cycles.
    pub failures: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Number of records pushed.
    pub pushed: usize,
    /// Number of records pulled.
    pub pulled: usize,
    /// How the merge resolved each identity.
    pub report: MergeReport,
    /// Duration of the cycle.
    pub duration: Duration,
    /// The new watermark.
    pub watermark: DateTime<Utc>,
}

/// The sync engine owns the replica and keeps it converging with a remote
/// repository.
pub struct SyncEngine<R: RemoteRepository, B: BlobStore> {
    config: SyncConfig,
    remote: R,
    replica: Mutex<ReplicaStore<B>>,
    /// Held for the whole of a cycle.
    cycle: tokio::sync::Mutex<()>,
    online: AtomicBool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    mutated: Notify,
}

impl<R: RemoteRepository, B: BlobStore> SyncEngine<R, B> {
    /// Creates a new sync engine. It starts offline until a cycle succeeds.
    pub fn new(config: SyncConfig, remote: R, replica: ReplicaStore<B>) -> Self {
        Self {
            config,
            remote,
            replica: Mutex::new(replica),
            cycle: tokio::sync::Mutex::new(()),
            online: AtomicBool::new(false),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            mutated: Notify::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote repository.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true if the last cycle reached the server.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Marks the engine offline without running a cycle.
    pub fn mark_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.set_state(SyncState::Offline);
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Visible records, newest first.
    pub fn expenses(&self) -> Vec<Expense> {
        self.replica.lock().visible()
    }

    /// Looks up a visible record.
    pub fn expense(&self, id: &ExpenseId) -> Option<Expense> {
        self.replica
            .lock()
            .get(id)
            .filter(|e| e.is_visible())
            .cloned()
    }

    /// Sum of visible amounts per category.
    pub fn totals_by_category(&self) -> BTreeMap<Category, Decimal> {
        self.replica.lock().totals_by_category()
    }

    /// Sum of all visible amounts.
    pub fn total(&self) -> Decimal {
        self.replica.lock().total()
    }

    /// Number of records waiting to be pushed.
    pub fn pending_count(&self) -> usize {
        self.replica.lock().pending_count()
    }

    /// The last applied watermark.
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.replica.lock().last_synced()
    }

    /// Validates and records a new expense.
    pub fn add_expense(&self, new: NewExpense) -> SyncResult<Expense> {
        let now = Utc::now();
        new.validate(now.date_naive())?;
        let expense = self.replica.lock().insert(new, now)?;
        self.after_mutation();
        Ok(expense)
    }

    /// Validates and applies an edit.
    pub fn update_expense(&self, id: &ExpenseId, patch: &ExpensePatch) -> SyncResult<Expense> {
        let now = Utc::now();
        patch.validate(now.date_naive())?;
        let expense = self.replica.lock().update(id, patch, now)?;
        self.after_mutation();
        Ok(expense)
    }

    /// Deletes an expense.
    ///
    /// A record that may already be on the server is tombstoned even while
    /// it still has a provisional id.
    pub fn delete_expense(&self, id: &ExpenseId) -> SyncResult<DeleteOutcome> {
        let outcome = self.replica.lock().mark_deleted(id, Utc::now())?;
        // A purge leaves nothing to push.
        if outcome == DeleteOutcome::Tombstoned {
            self.after_mutation();
        }
        Ok(outcome)
    }

    fn after_mutation(&self) {
        if self.is_online() {
            self.mutated.notify_one();
        }
    }

    /// Resolves once a mutation has been made while online.
    pub(crate) async fn mutation_signal(&self) {
        self.mutated.notified().await;
    }

    /// Runs one cycle: push pending records, pull changes, merge, apply.
    ///
    /// Cycles are serialized; a call made while one is running waits for it
    /// and then runs its own. Push and pull failures leave the replica
    /// untouched and flip the engine offline.
    pub async fn synchronize(&self) -> SyncResult<SyncCycleResult> {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();
        let snapshot = self.replica.lock().snapshot();
        let pending = snapshot.pending();

        // Push phase
        let mut echoes = Vec::new();
        if !pending.is_empty() {
            if let Err(e) = self.replica.lock().mark_in_doubt(&pending) {
                return Err(self.abandon(e));
            }
            self.set_state(SyncState::Pushing);
            debug!(count = pending.len(), "pushing pending expenses");
            echoes = match self.bounded(self.remote.push(&pending)).await {
                Ok(echoes) => echoes,
                Err(e) => return Err(self.fail(e)),
            };
        }
        let (local, rebound) = match rebind(snapshot.records(), &pending, echoes) {
            Ok(bound) => bound,
            Err(e) => return Err(self.fail(e)),
        };

        // Pull phase
        self.set_state(SyncState::Pulling);
        let since = snapshot.last_synced();
        debug!(?since, "pulling server changes");
        let fetched = match self.bounded(self.remote.fetch(since)).await {
            Ok(fetched) => fetched,
            Err(e) => return Err(self.fail(e)),
        };

        // Merge phase
        self.set_state(SyncState::Merging);
        let merge = reconcile_with_report(&local, &fetched.expenses);
        let applied = self.replica.lock().apply_sync(
            &snapshot,
            &rebound,
            merge.records,
            fetched.server_time,
            Utc::now(),
        );
        if let Err(e) = applied {
            return Err(self.abandon(e));
        }

        let result = SyncCycleResult {
            pushed: pending.len(),
            pulled: fetched.expenses.len(),
            report: merge.report,
            duration: start.elapsed(),
            watermark: fetched.server_time,
        };

        self.online.store(true, Ordering::SeqCst);
        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.records_pushed += result.pushed as u64;
            stats.records_pulled += result.pulled as u64;
            stats.conflicts_resolved += result.report.compared() as u64;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }
        info!(
            pushed = result.pushed,
            pulled = result.pulled,
            adopted = result.report.adopted_remote,
            kept_local = result.report.kept_local,
            duration_ms = result.duration.as_millis() as u64,
            "sync complete"
        );
        Ok(result)
    }

    async fn bounded<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    /// Ends a cycle that could not persist local state. Says nothing about
    /// connectivity, so the online flag is left alone.
    fn abandon(&self, error: SyncError) -> SyncError {
        self.set_state(SyncState::Idle);
        {
            let mut stats = self.stats.write();
            stats.failures += 1;
            stats.last_error = Some(error.to_string());
        }
        warn!(error = %error, "failed to persist sync state");
        error
    }

    /// Demotes a failed cycle to offline operation.
    fn fail(&self, error: SyncError) -> SyncError {
        self.online.store(false, Ordering::SeqCst);
        self.set_state(SyncState::Offline);
        {
            let mut stats = self.stats.write();
            stats.failures += 1;
            stats.last_error = Some(error.to_string());
        }
        warn!(error = %error, retryable = error.is_retryable(), "sync failed, continuing offline");
        error
    }
}

/// Replaces each pushed record in `records` with the server's echo and
/// collects the server ids assigned to provisional records.
fn rebind(
    records: &[Expense],
    pushed: &[Expense],
    echoes: Vec<Expense>,
) -> SyncResult<(Vec<Expense>, HashMap<ProvisionalToken, ServerId>)> {
    if echoes.len() != pushed.len() {
        return Err(SyncError::Protocol(format!(
            "pushed {} records but the server echoed {}",
            pushed.len(),
            echoes.len()
        )));
    }

    let mut rebound = HashMap::new();
    let mut replacements: HashMap<&ExpenseId, Expense> = HashMap::with_capacity(pushed.len());
    for (sent, echo) in pushed.iter().zip(echoes) {
        let Some(server_id) = echo.server_id().cloned() else {
            return Err(SyncError::Protocol(format!(
                "echo for {} carries no server id",
                sent.id
            )));
        };
        match &sent.id {
            ExpenseId::Provisional(token) => {
                rebound.insert(*token, server_id);
            }
            ExpenseId::Assigned(id) if *id != server_id => {
                return Err(SyncError::Protocol(format!(
                    "echo for {id} came back as {server_id}"
                )));
            }
            ExpenseId::Assigned(_) => {}
        }
        replacements.insert(&sent.id, echo.into_synced());
    }

    let local = records
        .iter()
        .map(|e| replacements.remove(&e.id).unwrap_or_else(|| e.clone()))
        .collect();
    Ok((local, rebound))
}

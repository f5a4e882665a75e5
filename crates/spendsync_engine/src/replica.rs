//! The local replica store.
//!
//! The replica is the device's full view of the record set, tombstones and
//! unsynced records included. It is the only owner of that state: other
//! components read it through views and change it through the mutation
//! methods here.
//!
//! ## Persistence layout
//!
//! Two JSON documents in a [`BlobStore`]:
//!
//! | Key | Content |
//! |-----|---------|
//! | `expenses` | array of [`Expense`] |
//! | `sync_state` | `{ "lastSynced": ..., "aliases": { token: server id }, "inDoubt": [token] }` |
//!
//! Absent or unparsable documents load as empty; the replica never fails
//! to open.
//!
//! `aliases` gains one entry per record this device created and is never
//! pruned, so it is bounded by the record count the same way tombstones
//! are. A provisional handle held by a caller keeps resolving for the life
//! of the replica.
//!
//! `inDoubt` lists provisional records that have been sent to the server
//! without a usable answer. The server may hold them already, so deleting
//! one leaves a tombstone to push instead of purging it.
//!
//! ## In-flight cycles
//!
//! A sync cycle works from a [`ReplicaSnapshot`]. Mutations made while the
//! cycle is in flight are tracked by generation and re-applied on top of
//! the merged result in [`ReplicaStore::apply_sync`].

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use spendsync_protocol::{
    Category, Expense, ExpenseId, ExpensePatch, NewExpense, ProvisionalToken, ServerId,
};
use spendsync_storage::BlobStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

const EXPENSES_KEY: &str = "expenses";
const SYNC_STATE_KEY: &str = "sync_state";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncDocument {
    last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    aliases: BTreeMap<ProvisionalToken, ServerId>,
    #[serde(default)]
    in_doubt: BTreeSet<ProvisionalToken>,
}

/// What [`ReplicaStore::mark_deleted`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The server has never seen the record, so it has been removed
    /// outright.
    Purged,
    /// The record has been tombstoned and will propagate on the next sync.
    Tombstoned,
}

/// The replica as it was when a sync cycle started.
#[derive(Debug, Clone)]
pub struct ReplicaSnapshot {
    generation: u64,
    records: Vec<Expense>,
    last_synced: Option<DateTime<Utc>>,
}

impl ReplicaSnapshot {
    /// Mutation counter at capture time.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every record, tombstones included.
    pub fn records(&self) -> &[Expense] {
        &self.records
    }

    /// Watermark at capture time.
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// Records that must be pushed.
    pub fn pending(&self) -> Vec<Expense> {
        self.records.iter().filter(|e| !e.synced).cloned().collect()
    }
}

/// The device's persisted record set.
pub struct ReplicaStore<B: BlobStore> {
    backend: B,
    records: Vec<Expense>,
    sync: SyncDocument,
    generation: u64,
    /// Id of each record mutated since the last applied sync, with the
    /// generation of its latest mutation.
    touched: HashMap<ExpenseId, u64>,
}

impl<B: BlobStore> ReplicaStore<B> {
    /// Loads the replica from `backend`.
    ///
    /// Missing or corrupt state is discarded with a warning.
    pub fn open(backend: B) -> Self {
        let records = dedupe(load::<Vec<Expense>>(&backend, EXPENSES_KEY));
        let sync = load::<SyncDocument>(&backend, SYNC_STATE_KEY);
        info!(
            records = records.len(),
            last_synced = ?sync.last_synced,
            "replica loaded"
        );
        Self {
            backend,
            records,
            sync,
            generation: 0,
            touched: HashMap::new(),
        }
    }

    /// Returns the storage backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Every record, tombstones included, in replica order.
    pub fn records(&self) -> &[Expense] {
        &self.records
    }

    /// Number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the replica holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a record, following provisional ids that have since been
    /// assigned.
    pub fn get(&self, id: &ExpenseId) -> Option<&Expense> {
        self.position(id).map(|i| &self.records[i])
    }

    /// Visible records, newest first.
    pub fn visible(&self) -> Vec<Expense> {
        spendsync_protocol::visible(&self.records)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Sum of visible amounts per category.
    pub fn totals_by_category(&self) -> BTreeMap<Category, Decimal> {
        spendsync_protocol::totals_by_category(&self.records)
    }

    /// Sum of all visible amounts.
    pub fn total(&self) -> Decimal {
        spendsync_protocol::total(&self.records)
    }

    /// Records not yet known to match the server.
    pub fn pending(&self) -> Vec<Expense> {
        self.records.iter().filter(|e| !e.synced).cloned().collect()
    }

    /// Number of records not yet known to match the server.
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|e| !e.synced).count()
    }

    /// The last applied watermark.
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.sync.last_synced
    }

    /// Adds a new record with a provisional id.
    pub fn insert(&mut self, new: NewExpense, now: DateTime<Utc>) -> SyncResult<Expense> {
        let expense = Expense::create(new, now);
        let mut next = self.records.clone();
        next.push(expense.clone());

        self.save(&next)?;
        self.records = next;
        self.touch(expense.id.clone());
        debug!(id = %expense.id, "expense inserted");
        Ok(expense)
    }

    /// Applies `patch` to a visible record.
    pub fn update(
        &mut self,
        id: &ExpenseId,
        patch: &ExpensePatch,
        now: DateTime<Utc>,
    ) -> SyncResult<Expense> {
        let index = self
            .visible_position(id)
            .ok_or_else(|| SyncError::NotFound(id.clone()))?;
        let mut next = self.records.clone();
        next[index].apply_patch(patch, now);
        let updated = next[index].clone();

        self.save(&next)?;
        self.records = next;
        self.touch(updated.id.clone());
        debug!(id = %updated.id, "expense updated");
        Ok(updated)
    }

    /// Deletes a visible record.
    ///
    /// A record the server has never seen is purged, since there is no
    /// remote copy to tombstone. Anything else is tombstoned, including a
    /// provisional record whose push is in doubt.
    pub fn mark_deleted(&mut self, id: &ExpenseId, now: DateTime<Utc>) -> SyncResult<DeleteOutcome> {
        let index = self
            .visible_position(id)
            .ok_or_else(|| SyncError::NotFound(id.clone()))?;
        let target = self.records[index].id.clone();
        let unseen = target
            .provisional_token()
            .is_some_and(|token| !self.sync.in_doubt.contains(&token));
        let mut next = self.records.clone();
        let outcome = if unseen {
            next.remove(index);
            DeleteOutcome::Purged
        } else {
            next[index].tombstone(now);
            DeleteOutcome::Tombstoned
        };

        self.save(&next)?;
        self.records = next;
        self.touch(target.clone());
        debug!(id = %target, ?outcome, "expense deleted");
        Ok(outcome)
    }

    /// Provisional records whose push has gone out without a usable answer.
    pub fn in_doubt(&self) -> &BTreeSet<ProvisionalToken> {
        &self.sync.in_doubt
    }

    /// Records that `pushing` is about to be sent.
    ///
    /// Their provisional tokens stay in doubt until a cycle that pushed
    /// them is applied. Persisted before returning so that a crash after
    /// the push cannot turn a later delete into a purge.
    pub fn mark_in_doubt(&mut self, pushing: &[Expense]) -> SyncResult<()> {
        let mut sync = self.sync.clone();
        let before = sync.in_doubt.len();
        sync.in_doubt
            .extend(pushing.iter().filter_map(|e| e.id.provisional_token()));
        if sync.in_doubt.len() == before {
            return Ok(());
        }

        self.backend
            .put(SYNC_STATE_KEY, &serde_json::to_vec(&sync)?)?;
        debug!(
            added = sync.in_doubt.len() - before,
            "provisional records in flight"
        );
        self.sync = sync;
        Ok(())
    }

    /// Captures the state a sync cycle works from.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        ReplicaSnapshot {
            generation: self.generation,
            records: self.records.clone(),
            last_synced: self.sync.last_synced,
        }
    }

    /// Replaces the record set with the outcome of a sync cycle.
    ///
    /// `rebound` maps the provisional tokens pushed in the cycle to the
    /// server ids they were assigned. `merged` is the reconciled set built
    /// from `snapshot`. Mutations made after `snapshot` are re-applied on
    /// top of it, rebound to server ids where needed. Nothing changes
    /// unless both documents are persisted.
    pub fn apply_sync(
        &mut self,
        snapshot: &ReplicaSnapshot,
        rebound: &HashMap<ProvisionalToken, ServerId>,
        merged: Vec<Expense>,
        watermark: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SyncResult<()> {
        let mut next = merged;
        let mut overlaid = 0usize;

        for record in &self.records {
            if !self.touched_after(&record.id, snapshot.generation) {
                continue;
            }
            let mut current = record.clone();
            if let Some(id) = current.id.provisional_token().and_then(|t| rebound.get(&t)) {
                current.id = ExpenseId::Assigned(id.clone());
            }
            upsert(&mut next, current);
            overlaid += 1;
        }

        // Purged during the cycle. Only provisional records are ever purged.
        for (id, &generation) in &self.touched {
            if generation <= snapshot.generation || self.records.iter().any(|e| &e.id == id) {
                continue;
            }
            let Some(token) = id.provisional_token() else {
                continue;
            };
            match rebound.get(&token) {
                Some(server_id) => {
                    let target = ExpenseId::Assigned(server_id.clone());
                    if let Some(echo) = next.iter_mut().find(|e| e.id == target) {
                        echo.tombstone(now);
                    }
                }
                None => next.retain(|e| &e.id != id),
            }
            overlaid += 1;
        }

        let mut sync = self.sync.clone();
        sync.last_synced = Some(watermark);
        sync.aliases
            .extend(rebound.iter().map(|(token, id)| (*token, id.clone())));
        sync.in_doubt.retain(|token| !rebound.contains_key(token));

        self.save(&next)?;
        self.backend
            .put(SYNC_STATE_KEY, &serde_json::to_vec(&sync)?)?;

        self.records = next;
        self.sync = sync;
        self.touched.clear();
        debug!(
            records = self.records.len(),
            overlaid,
            %watermark,
            "sync result applied"
        );
        Ok(())
    }

    fn save(&self, records: &[Expense]) -> SyncResult<()> {
        let bytes = serde_json::to_vec(records)?;
        self.backend.put(EXPENSES_KEY, &bytes)?;
        Ok(())
    }

    fn touch(&mut self, id: ExpenseId) {
        self.generation += 1;
        self.touched.insert(id, self.generation);
    }

    fn touched_after(&self, id: &ExpenseId, generation: u64) -> bool {
        self.touched.get(id).is_some_and(|&g| g > generation)
    }

    fn resolve(&self, id: &ExpenseId) -> ExpenseId {
        match id {
            ExpenseId::Provisional(token) => match self.sync.aliases.get(token) {
                Some(server_id) => ExpenseId::Assigned(server_id.clone()),
                None => id.clone(),
            },
            ExpenseId::Assigned(_) => id.clone(),
        }
    }

    fn position(&self, id: &ExpenseId) -> Option<usize> {
        let id = self.resolve(id);
        self.records.iter().position(|e| e.id == id)
    }

    fn visible_position(&self, id: &ExpenseId) -> Option<usize> {
        self.position(id).filter(|&i| self.records[i].is_visible())
    }
}

fn load<T: DeserializeOwned + Default>(backend: &impl BlobStore, key: &str) -> T {
    match backend.get(key) {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(error) => {
                warn!(key, %error, "discarding corrupt replica document");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(error) => {
            warn!(key, %error, "replica document unreadable, starting empty");
            T::default()
        }
    }
}

/// Collapses repeated ids to the newest version, keeping first position.
fn dedupe(records: Vec<Expense>) -> Vec<Expense> {
    let mut index: HashMap<ExpenseId, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<Expense> = Vec::with_capacity(records.len());
    for record in records {
        match index.get(&record.id) {
            Some(&i) => {
                if record.updated_at >= out[i].updated_at {
                    out[i] = record;
                }
            }
            None => {
                index.insert(record.id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

fn upsert(records: &mut Vec<Expense>, record: Expense) {
    match records.iter().position(|e| e.id == record.id) {
        Some(i) => records[i] = record,
        None => records.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use spendsync_protocol::reconcile;
    use spendsync_storage::{FileBlobStore, InMemoryBlobStore};
    use std::sync::Arc;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn new(amount: &str, category: &str, description: &str) -> NewExpense {
        NewExpense::parse(
            amount,
            category,
            description,
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        )
        .unwrap()
    }

    fn memory() -> ReplicaStore<Arc<InMemoryBlobStore>> {
        ReplicaStore::open(Arc::new(InMemoryBlobStore::new()))
    }

    /// Pretends the server accepted every pending record: returns the
    /// echoes and the rebound map a real cycle would produce.
    fn echo_pending(
        snapshot: &ReplicaSnapshot,
    ) -> (Vec<Expense>, HashMap<ProvisionalToken, ServerId>) {
        let mut rebound = HashMap::new();
        let local: Vec<Expense> = snapshot
            .records()
            .iter()
            .map(|e| {
                let mut echo = e.clone();
                if let Some(token) = e.id.provisional_token() {
                    let id = ServerId::new(format!("srv-{}", rebound.len() + 1));
                    rebound.insert(token, id.clone());
                    echo.id = id.into();
                }
                echo.into_synced()
            })
            .collect();
        (local, rebound)
    }

    #[test]
    fn open_empty_backend() {
        let replica = memory();
        assert!(replica.is_empty());
        assert_eq!(replica.last_synced(), None);
    }

    #[test]
    fn corrupt_documents_load_as_empty() {
        let backend = InMemoryBlobStore::with_entry(EXPENSES_KEY, b"{not json".to_vec());
        backend.put(SYNC_STATE_KEY, b"[1,2,3]").unwrap();

        let replica = ReplicaStore::open(backend);
        assert!(replica.is_empty());
        assert_eq!(replica.last_synced(), None);
    }

    #[test]
    fn duplicate_ids_collapse_to_newest_on_load() {
        let mut old = Expense::create(new("1", "food", "old"), t(0));
        old.id = ServerId::new("a").into();
        let mut newer = old.clone();
        newer.description = "newer".into();
        newer.updated_at = t(5);

        let bytes = serde_json::to_vec(&vec![old, newer]).unwrap();
        let replica = ReplicaStore::open(InMemoryBlobStore::with_entry(EXPENSES_KEY, bytes));
        assert_eq!(replica.len(), 1);
        assert_eq!(replica.records()[0].description, "newer");
    }

    #[test]
    fn insert_persists_before_returning() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let mut replica = ReplicaStore::open(Arc::clone(&backend));
        let expense = replica.insert(new("12.50", "food", "lunch"), t(0)).unwrap();

        assert!(expense.id.is_provisional());
        assert!(!expense.synced);

        let reopened = ReplicaStore::open(backend);
        assert_eq!(reopened.records(), &[expense]);
    }

    #[test]
    fn failed_write_leaves_state_untouched() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let mut replica = ReplicaStore::open(Arc::clone(&backend));
        replica.insert(new("1", "food", "kept"), t(0)).unwrap();

        backend.set_fail_writes(true);
        let err = replica.insert(new("2", "food", "lost"), t(1)).unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(replica.len(), 1);
        assert_eq!(replica.snapshot().generation(), 1);
    }

    #[test]
    fn deleting_unsynced_record_purges_it() {
        let mut replica = memory();
        let expense = replica.insert(new("5", "other", "oops"), t(0)).unwrap();

        let outcome = replica.mark_deleted(&expense.id, t(1)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Purged);
        assert!(replica.is_empty());
        assert!(replica.pending().is_empty());
    }

    #[test]
    fn deleting_in_doubt_record_tombstones_it() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let mut replica = ReplicaStore::open(Arc::clone(&backend));
        let expense = replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        replica.mark_in_doubt(&replica.pending()).unwrap();

        // A restart keeps the record in doubt
        let mut replica = ReplicaStore::open(backend);
        let outcome = replica.mark_deleted(&expense.id, t(1)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Tombstoned);

        let tombstone = &replica.records()[0];
        assert_eq!(tombstone.id, expense.id);
        assert!(tombstone.deleted);
        assert_eq!(replica.pending().len(), 1);
    }

    #[test]
    fn rebinding_clears_in_doubt() {
        let mut replica = memory();
        replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        replica.mark_in_doubt(&replica.pending()).unwrap();
        assert_eq!(replica.in_doubt().len(), 1);

        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(1), t(1))
            .unwrap();
        assert!(replica.in_doubt().is_empty());
    }

    #[test]
    fn aliases_grow_only_with_new_records() {
        let mut replica = memory();
        replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        replica.insert(new("6", "food", "dinner"), t(0)).unwrap();
        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(1), t(1))
            .unwrap();
        assert_eq!(replica.sync.aliases.len(), 2);

        // Later cycles with nothing provisional add nothing
        for secs in 2..5 {
            let snapshot = replica.snapshot();
            let merged = snapshot.records().to_vec();
            replica
                .apply_sync(&snapshot, &HashMap::new(), merged, t(secs), t(secs))
                .unwrap();
        }
        assert_eq!(replica.sync.aliases.len(), 2);
        assert_eq!(replica.len(), 2);
    }

    #[test]
    fn deleting_synced_record_tombstones_it() {
        let mut replica = memory();
        replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(1), t(1))
            .unwrap();

        let id = replica.records()[0].id.clone();
        let outcome = replica.mark_deleted(&id, t(2)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Tombstoned);

        let tombstone = &replica.records()[0];
        assert!(tombstone.deleted);
        assert!(!tombstone.synced);
        assert_eq!(tombstone.updated_at, t(2));
        assert!(replica.visible().is_empty());
        assert_eq!(replica.pending_count(), 1);

        // Already deleted
        assert!(matches!(
            replica.mark_deleted(&id, t(3)),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn update_bumps_and_unsyncs() {
        let mut replica = memory();
        let expense = replica.insert(new("5", "food", "lunch"), t(0)).unwrap();

        let patch = ExpensePatch {
            amount: Some("7.25".parse().unwrap()),
            ..ExpensePatch::default()
        };
        let updated = replica.update(&expense.id, &patch, t(0)).unwrap();
        assert!(updated.updated_at > expense.updated_at);
        assert_eq!(updated.amount.value(), dec!(7.25));
        assert_eq!(replica.total(), dec!(7.25));
    }

    #[test]
    fn stale_provisional_id_resolves_after_sync() {
        let mut replica = memory();
        let expense = replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(1), t(1))
            .unwrap();

        let found = replica.get(&expense.id).unwrap();
        assert_eq!(found.server_id().map(ServerId::as_str), Some("srv-1"));
        assert!(found.synced);

        let outcome = replica.mark_deleted(&expense.id, t(2)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Tombstoned);
    }

    #[test]
    fn apply_sync_persists_watermark_and_aliases() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let mut replica = ReplicaStore::open(Arc::clone(&backend));
        let expense = replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(9), t(9))
            .unwrap();

        let reopened = ReplicaStore::open(backend);
        assert_eq!(reopened.last_synced(), Some(t(9)));
        assert!(reopened.get(&expense.id).is_some());
        assert_eq!(reopened.pending_count(), 0);
    }

    #[test]
    fn apply_sync_failure_changes_nothing() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let mut replica = ReplicaStore::open(Arc::clone(&backend));
        replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);

        backend.set_fail_writes(true);
        assert!(replica
            .apply_sync(&snapshot, &rebound, local, t(1), t(1))
            .is_err());
        assert!(replica.records()[0].id.is_provisional());
        assert_eq!(replica.last_synced(), None);
    }

    #[test]
    fn mutations_during_cycle_survive() {
        let mut replica = memory();
        let first = replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        let snapshot = replica.snapshot();

        // While the cycle is in flight
        let patch = ExpensePatch {
            description: Some("late lunch".into()),
            ..ExpensePatch::default()
        };
        replica.update(&first.id, &patch, t(2)).unwrap();
        let second = replica.insert(new("3", "transport", "bus"), t(3)).unwrap();

        let (local, rebound) = echo_pending(&snapshot);
        let merged = reconcile(&local, &[]);
        replica
            .apply_sync(&snapshot, &rebound, merged, t(4), t(4))
            .unwrap();

        assert_eq!(replica.len(), 2);
        let edited = replica.get(&first.id).unwrap();
        assert_eq!(edited.description, "late lunch");
        assert_eq!(edited.server_id().map(ServerId::as_str), Some("srv-1"));
        assert!(!edited.synced);

        let added = replica.get(&second.id).unwrap();
        assert!(added.id.is_provisional());
        assert_eq!(replica.pending_count(), 2);
    }

    #[test]
    fn purge_of_pushed_record_becomes_tombstone() {
        let mut replica = memory();
        let expense = replica.insert(new("5", "food", "lunch"), t(0)).unwrap();
        let snapshot = replica.snapshot();

        // Deleted after the push went out
        assert_eq!(
            replica.mark_deleted(&expense.id, t(1)).unwrap(),
            DeleteOutcome::Purged
        );

        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(2), t(2))
            .unwrap();

        assert_eq!(replica.len(), 1);
        let tombstone = &replica.records()[0];
        assert!(tombstone.deleted);
        assert!(!tombstone.synced);
        assert_eq!(tombstone.server_id().map(ServerId::as_str), Some("srv-1"));
        assert!(replica.visible().is_empty());
    }

    #[test]
    fn totals_exclude_tombstones() {
        let mut replica = memory();
        replica.insert(new("12.50", "food", "lunch"), t(0)).unwrap();
        replica.insert(new("4", "food", "snack"), t(1)).unwrap();
        replica.insert(new("20", "travel", "train"), t(2)).unwrap();
        let snapshot = replica.snapshot();
        let (local, rebound) = echo_pending(&snapshot);
        replica
            .apply_sync(&snapshot, &rebound, local, t(3), t(3))
            .unwrap();

        let snack = replica.records()[1].id.clone();
        replica.mark_deleted(&snack, t(4)).unwrap();

        let totals = replica.totals_by_category();
        assert_eq!(totals.get(&Category::Food), Some(&dec!(12.50)));
        assert_eq!(totals.get(&Category::Travel), Some(&dec!(20.00)));
        assert_eq!(replica.total(), dec!(32.50));
    }

    #[test]
    fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let expense = {
            let mut replica = ReplicaStore::open(FileBlobStore::open(dir.path()).unwrap());
            replica.insert(new("12.50", "food", "lunch"), t(0)).unwrap()
        };

        let replica = ReplicaStore::open(FileBlobStore::open(dir.path()).unwrap());
        assert_eq!(replica.records(), &[expense]);
    }
}

//! Remote repository abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spendsync_protocol::{Expense, ExpenseId, FetchResponse, ProvisionalToken, ServerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The authoritative store as seen from a replica.
///
/// This trait abstracts the network layer. Each call either succeeds with
/// data or fails as a whole; no partial-batch success is assumed.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Returns records changed after `since` (everything when `None`),
    /// tombstones included, plus the server's high-water mark.
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> SyncResult<FetchResponse>;

    /// Upserts a batch. Records with a provisional id are created and
    /// assigned a server id. Returns the stored state of each submitted
    /// record, in submission order.
    async fn push(&self, batch: &[Expense]) -> SyncResult<Vec<Expense>>;

    /// Tombstones a single record server-side.
    async fn delete(&self, id: &ServerId) -> SyncResult<Expense>;
}

#[async_trait]
impl<T: RemoteRepository + ?Sized> RemoteRepository for Arc<T> {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> SyncResult<FetchResponse> {
        (**self).fetch(since).await
    }

    async fn push(&self, batch: &[Expense]) -> SyncResult<Vec<Expense>> {
        (**self).push(batch).await
    }

    async fn delete(&self, id: &ServerId) -> SyncResult<Expense> {
        (**self).delete(id).await
    }
}

/// Failure injected by [`MockRepository`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockFailure {
    /// Calls succeed.
    #[default]
    None,
    /// Every call fails with a retryable transport error.
    Offline,
    /// Every call fails with a 500.
    ServerError,
    /// Pushes are applied but the echo drops its last record.
    ShortEcho,
}

#[derive(Debug, Default)]
struct MockStore {
    /// Records with their server change stamp.
    records: Vec<(DateTime<Utc>, Expense)>,
    aliases: HashMap<ProvisionalToken, ServerId>,
    last_stamp: Option<DateTime<Utc>>,
    pushed: Vec<Vec<Expense>>,
    fetches: Vec<Option<DateTime<Utc>>>,
}

impl MockStore {
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn position(&self, id: &ServerId) -> Option<usize> {
        self.records
            .iter()
            .position(|(_, e)| e.server_id() == Some(id))
    }

    fn upsert(&mut self, incoming: &Expense) -> Expense {
        let id = match &incoming.id {
            ExpenseId::Assigned(id) => id.clone(),
            ExpenseId::Provisional(token) => self
                .aliases
                .entry(*token)
                .or_insert_with(ServerId::generate)
                .clone(),
        };

        let mut candidate = incoming.clone();
        candidate.id = ExpenseId::Assigned(id.clone());
        candidate.synced = true;

        match self.position(&id) {
            Some(index) => {
                if candidate.updated_at > self.records[index].1.updated_at {
                    let stamp = self.next_stamp();
                    self.records[index] = (stamp, candidate);
                }
                self.records[index].1.clone()
            }
            None => {
                let stamp = self.next_stamp();
                self.records.push((stamp, candidate.clone()));
                candidate
            }
        }
    }
}

/// An in-memory stand-in for the authoritative store, for tests.
///
/// Behaves like the reference server (provisional ids get fresh server
/// ids, retried provisional pushes are idempotent, overwrites require a
/// strictly newer `updated_at`) and records every call.
#[derive(Debug, Default)]
pub struct MockRepository {
    store: Mutex<MockStore>,
    failure: Mutex<MockFailure>,
    delay: Mutex<Duration>,
}

impl MockRepository {
    /// Creates an empty, healthy repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure mode for subsequent calls.
    pub fn set_failure(&self, failure: MockFailure) {
        *self.failure.lock() = failure;
    }

    /// Delays every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Stores a record as if another replica had written it.
    ///
    /// The record must carry a server id.
    pub fn seed(&self, expense: Expense) {
        let mut store = self.store.lock();
        let stamp = store.next_stamp();
        let expense = expense.into_synced();
        match expense.server_id().and_then(|id| store.position(id)) {
            Some(index) => store.records[index] = (stamp, expense),
            None => store.records.push((stamp, expense)),
        }
    }

    /// Returns the server-side records.
    pub fn records(&self) -> Vec<Expense> {
        self.store.lock().records.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Returns the server-side record with this id.
    pub fn get(&self, id: &ServerId) -> Option<Expense> {
        let store = self.store.lock();
        store.position(id).map(|i| store.records[i].1.clone())
    }

    /// Returns every batch received by `push`.
    pub fn pushed(&self) -> Vec<Vec<Expense>> {
        self.store.lock().pushed.clone()
    }

    /// Returns the `since` argument of every `fetch`.
    pub fn fetches(&self) -> Vec<Option<DateTime<Utc>>> {
        self.store.lock().fetches.clone()
    }

    async fn enter(&self) -> SyncResult<MockFailure> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.failure.lock();
        match failure {
            MockFailure::Offline => Err(SyncError::transport_retryable("mock repository offline")),
            MockFailure::ServerError => Err(SyncError::Server {
                status: 500,
                message: "mock repository failure".into(),
            }),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl RemoteRepository for MockRepository {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> SyncResult<FetchResponse> {
        self.enter().await?;
        let mut store = self.store.lock();
        store.fetches.push(since);

        let expenses = store
            .records
            .iter()
            .filter(|(stamp, _)| since.map_or(true, |since| *stamp > since))
            .map(|(_, e)| e.clone())
            .collect();
        let server_time = store.last_stamp.or(since).unwrap_or_default();

        Ok(FetchResponse {
            expenses,
            server_time,
        })
    }

    async fn push(&self, batch: &[Expense]) -> SyncResult<Vec<Expense>> {
        let failure = self.enter().await?;
        let mut store = self.store.lock();
        store.pushed.push(batch.to_vec());

        let mut echoes: Vec<Expense> = batch.iter().map(|e| store.upsert(e)).collect();
        if failure == MockFailure::ShortEcho {
            echoes.pop();
        }
        Ok(echoes)
    }

    async fn delete(&self, id: &ServerId) -> SyncResult<Expense> {
        self.enter().await?;
        let mut store = self.store.lock();
        let index = store
            .position(id)
            .ok_or_else(|| SyncError::NotFound(ExpenseId::Assigned(id.clone())))?;

        let stamp = store.next_stamp();
        let (slot_stamp, record) = &mut store.records[index];
        record.deleted = true;
        record.updated_at = spendsync_protocol::bump_timestamp(record.updated_at, Utc::now());
        *slot_stamp = stamp;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use spendsync_protocol::NewExpense;

    fn lunch() -> Expense {
        let new = NewExpense::parse(
            "12.50",
            "food",
            "lunch",
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        )
        .unwrap();
        Expense::create(new, Utc::now())
    }

    #[tokio::test]
    async fn mock_assigns_ids_to_provisional_records() {
        let remote = MockRepository::new();
        let local = lunch();

        let echoes = remote.push(&[local.clone()]).await.unwrap();
        assert_eq!(echoes.len(), 1);
        assert!(echoes[0].server_id().is_some());
        assert!(echoes[0].synced);
        assert_eq!(echoes[0].updated_at, local.updated_at);
    }

    #[tokio::test]
    async fn mock_retried_push_is_idempotent() {
        let remote = MockRepository::new();
        let local = lunch();

        let first = remote.push(&[local.clone()]).await.unwrap();
        let second = remote.push(&[local]).await.unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(remote.records().len(), 1);
    }

    #[tokio::test]
    async fn mock_fetch_since_watermark() {
        let remote = MockRepository::new();
        remote.push(&[lunch()]).await.unwrap();

        let all = remote.fetch(None).await.unwrap();
        assert_eq!(all.expenses.len(), 1);

        let none = remote.fetch(Some(all.server_time)).await.unwrap();
        assert!(none.expenses.is_empty());
        assert_eq!(none.server_time, all.server_time);
        assert_eq!(remote.fetches(), vec![None, Some(all.server_time)]);
    }

    #[tokio::test]
    async fn mock_failure_modes() {
        let remote = MockRepository::new();

        remote.set_failure(MockFailure::Offline);
        let err = remote.fetch(None).await.unwrap_err();
        assert!(err.is_retryable());

        remote.set_failure(MockFailure::ServerError);
        assert!(matches!(
            remote.push(&[lunch()]).await,
            Err(SyncError::Server { status: 500, .. })
        ));

        remote.set_failure(MockFailure::ShortEcho);
        let echoes = remote.push(&[lunch(), lunch()]).await.unwrap();
        assert_eq!(echoes.len(), 1);
    }

    #[tokio::test]
    async fn mock_delete_tombstones() {
        let remote = MockRepository::new();
        let echo = remote.push(&[lunch()]).await.unwrap().remove(0);
        let id = echo.server_id().unwrap().clone();

        let deleted = remote.delete(&id).await.unwrap();
        assert!(deleted.deleted);
        assert!(deleted.updated_at > echo.updated_at);

        let missing = ServerId::new("missing");
        assert!(matches!(
            remote.delete(&missing).await,
            Err(SyncError::NotFound(_))
        ));
    }
}

//! In-memory authoritative expense store.
//!
//! Every write assigns the record a server change stamp. Stamps are
//! strictly increasing, so `fetch(since)` with the `serverTime` of a
//! previous fetch returns exactly the records written after it.

use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use spendsync_protocol::{
    bump_timestamp, Expense, ExpenseId, ExpensePatch, FetchResponse, NewExpense,
    ProvisionalToken, ServerId,
};
use std::collections::HashMap;
use tracing::debug;

/// A stored record with its change stamp.
#[derive(Debug, Clone)]
struct Stored {
    stamp: DateTime<Utc>,
    expense: Expense,
}

#[derive(Debug, Default)]
struct Inner {
    /// Records in creation order.
    records: Vec<Stored>,
    /// Server id to position in `records`.
    index: HashMap<ServerId, usize>,
    /// Provisional tokens already turned into server ids. Kept for good,
    /// so a retry arriving at any later point maps to the same record.
    /// Grows with the record count, never faster.
    aliases: HashMap<ProvisionalToken, ServerId>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn get(&self, id: &ServerId) -> Option<&Expense> {
        self.index.get(id).map(|&i| &self.records[i].expense)
    }

    /// Stores `expense` under its server id with a fresh stamp.
    fn write(&mut self, expense: Expense) -> ServerResult<Expense> {
        let id = expense
            .server_id()
            .cloned()
            .ok_or_else(|| ServerError::Internal("record without server id".into()))?;
        let stamp = self.next_stamp();
        let expense = expense.into_synced();
        match self.index.get(&id) {
            Some(&i) => {
                self.records[i] = Stored {
                    stamp,
                    expense: expense.clone(),
                }
            }
            None => {
                self.index.insert(id, self.records.len());
                self.records.push(Stored {
                    stamp,
                    expense: expense.clone(),
                });
            }
        }
        Ok(expense)
    }

    /// Applies one pushed record and returns the stored state.
    fn upsert(&mut self, incoming: Expense) -> ServerResult<Expense> {
        let id = match &incoming.id {
            ExpenseId::Assigned(id) => id.clone(),
            ExpenseId::Provisional(token) => self
                .aliases
                .entry(*token)
                .or_insert_with(ServerId::generate)
                .clone(),
        };

        match self.get(&id) {
            Some(current) if incoming.updated_at <= current.updated_at => Ok(current.clone()),
            _ => {
                let mut candidate = incoming;
                candidate.id = ExpenseId::Assigned(id);
                self.write(candidate)
            }
        }
    }
}

/// The server's record repository.
#[derive(Debug, Default)]
pub struct ExpenseRepository {
    inner: RwLock<Inner>,
}

impl ExpenseRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records, tombstones included.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the record with this id.
    pub fn get(&self, id: &ServerId) -> Option<Expense> {
        self.inner.read().get(id).cloned()
    }

    /// Returns records stamped after `since` (all when `None`), tombstones
    /// included, in creation order.
    ///
    /// `server_time` is the newest stamp in the store. When nothing has
    /// been written it echoes `since`, or the Unix epoch for a full pull.
    pub fn fetch(&self, since: Option<DateTime<Utc>>) -> FetchResponse {
        let inner = self.inner.read();
        let expenses: Vec<Expense> = inner
            .records
            .iter()
            .filter(|s| since.map_or(true, |since| s.stamp > since))
            .map(|s| s.expense.clone())
            .collect();
        debug!(count = expenses.len(), ?since, "fetch");
        FetchResponse {
            expenses,
            server_time: inner.last_stamp.or(since).unwrap_or_default(),
        }
    }

    /// Upserts a batch and returns the stored state of each record in
    /// submission order.
    ///
    /// The whole batch is validated before anything is written. An
    /// existing record is only replaced by a strictly newer `updatedAt`.
    /// A provisional record gets a server id on first sight; resubmitting
    /// the same provisional record maps to the same server id.
    pub fn push(&self, batch: Vec<Expense>) -> ServerResult<Vec<Expense>> {
        for expense in &batch {
            expense.validate()?;
        }

        let mut inner = self.inner.write();
        let echoes = batch
            .into_iter()
            .map(|expense| inner.upsert(expense))
            .collect::<ServerResult<Vec<_>>>()?;
        debug!(count = echoes.len(), "push applied");
        Ok(echoes)
    }

    /// Creates a record from user input.
    pub fn create(&self, new: NewExpense) -> ServerResult<Expense> {
        let now = Utc::now();
        new.validate(now.date_naive())?;
        let mut expense = Expense::create(new, now);
        expense.id = ServerId::generate().into();
        self.inner.write().write(expense)
    }

    /// Applies a partial edit to a live record.
    pub fn update(&self, id: &ServerId, patch: &ExpensePatch) -> ServerResult<Expense> {
        if patch.is_empty() {
            return Err(ServerError::InvalidRequest("update changes no fields".into()));
        }
        let now = Utc::now();
        patch.validate(now.date_naive())?;

        let mut inner = self.inner.write();
        let mut expense = inner
            .get(id)
            .filter(|e| e.is_visible())
            .cloned()
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        expense.apply_patch(patch, now);
        inner.write(expense)
    }

    /// Tombstones a record.
    ///
    /// Deleting a record that is already tombstoned returns it unchanged.
    pub fn delete(&self, id: &ServerId) -> ServerResult<Expense> {
        let mut inner = self.inner.write();
        let mut expense = inner
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        if expense.deleted {
            return Ok(expense);
        }
        expense.deleted = true;
        expense.updated_at = bump_timestamp(expense.updated_at, Utc::now());
        inner.write(expense)
    }

    /// Returns live records, newest expense date first.
    pub fn visible(&self) -> Vec<Expense> {
        let inner = self.inner.read();
        let records: Vec<Expense> = inner.records.iter().map(|s| s.expense.clone()).collect();
        spendsync_protocol::visible(&records)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Renders live records as CSV with a header row.
    pub fn export_csv(&self) -> ServerResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["date", "description", "category", "amount"])?;
        for expense in self.visible() {
            writer.write_record([
                expense.date.to_string(),
                expense.description,
                expense.category.to_string(),
                expense.amount.to_string(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lunch() -> NewExpense {
        NewExpense::parse(
            "12.50",
            "food",
            "lunch",
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        )
        .unwrap()
    }

    fn local(new: NewExpense) -> Expense {
        Expense::create(new, Utc::now())
    }

    #[test]
    fn push_assigns_server_ids() {
        let repo = ExpenseRepository::new();
        let record = local(lunch());

        let echoes = repo.push(vec![record.clone()]).unwrap();
        assert_eq!(echoes.len(), 1);
        let id = echoes[0].server_id().unwrap();
        assert!(echoes[0].synced);
        assert_eq!(echoes[0].updated_at, record.updated_at);
        assert_eq!(repo.get(id).unwrap().description, "lunch");
    }

    #[test]
    fn retried_provisional_push_does_not_duplicate() {
        let repo = ExpenseRepository::new();
        let record = local(lunch());

        let first = repo.push(vec![record.clone()]).unwrap();
        let second = repo.push(vec![record]).unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn older_push_does_not_overwrite() {
        let repo = ExpenseRepository::new();
        let stored = repo.create(lunch()).unwrap();

        let mut stale = stored.clone();
        stale.description = "stale".into();
        stale.updated_at = stored.updated_at - Duration::seconds(10);
        let echo = repo.push(vec![stale]).unwrap().remove(0);
        assert_eq!(echo.description, "lunch");

        let mut same = stored.clone();
        same.description = "same instant".into();
        let echo = repo.push(vec![same]).unwrap().remove(0);
        assert_eq!(echo.description, "lunch");

        let mut newer = stored.clone();
        newer.description = "newer".into();
        newer.updated_at = stored.updated_at + Duration::seconds(10);
        let echo = repo.push(vec![newer]).unwrap().remove(0);
        assert_eq!(echo.description, "newer");
    }

    #[test]
    fn tombstone_is_not_resurrected_by_older_push() {
        let repo = ExpenseRepository::new();
        let stored = repo.create(lunch()).unwrap();
        let id = stored.server_id().unwrap().clone();
        repo.delete(&id).unwrap();

        let echo = repo.push(vec![stored]).unwrap().remove(0);
        assert!(echo.deleted);
    }

    #[test]
    fn push_is_all_or_nothing() {
        let repo = ExpenseRepository::new();
        let mut blank = local(lunch());
        blank.description = "   ".into();

        assert!(matches!(
            repo.push(vec![local(lunch()), blank]),
            Err(ServerError::Validation(_))
        ));
        assert!(repo.is_empty());
    }

    #[test]
    fn push_creates_unknown_assigned_id() {
        let repo = ExpenseRepository::new();
        let mut record = local(lunch());
        record.id = ServerId::new("a1").into();

        repo.push(vec![record]).unwrap();
        assert!(repo.get(&ServerId::new("a1")).is_some());
    }

    #[test]
    fn fetch_since_server_time() {
        let repo = ExpenseRepository::new();
        let empty = repo.fetch(None);
        assert!(empty.expenses.is_empty());
        assert_eq!(empty.server_time, DateTime::<Utc>::default());

        repo.create(lunch()).unwrap();
        let all = repo.fetch(None);
        assert_eq!(all.expenses.len(), 1);

        let none = repo.fetch(Some(all.server_time));
        assert!(none.expenses.is_empty());
        assert_eq!(none.server_time, all.server_time);

        let second = repo.create(lunch()).unwrap();
        let changed = repo.fetch(Some(all.server_time));
        assert_eq!(changed.expenses, vec![second]);
        assert!(changed.server_time > all.server_time);
    }

    #[test]
    fn delete_tombstones_and_is_fetched() {
        let repo = ExpenseRepository::new();
        let stored = repo.create(lunch()).unwrap();
        let id = stored.server_id().unwrap().clone();
        let watermark = repo.fetch(None).server_time;

        let deleted = repo.delete(&id).unwrap();
        assert!(deleted.deleted);
        assert!(deleted.updated_at > stored.updated_at);

        let changed = repo.fetch(Some(watermark));
        assert_eq!(changed.expenses, vec![deleted.clone()]);

        // Idempotent
        assert_eq!(repo.delete(&id).unwrap(), deleted);
        assert!(matches!(
            repo.delete(&ServerId::new("missing")),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn update_applies_patch() {
        let repo = ExpenseRepository::new();
        let stored = repo.create(lunch()).unwrap();
        let id = stored.server_id().unwrap().clone();

        let patch = ExpensePatch {
            description: Some("dinner".into()),
            ..ExpensePatch::default()
        };
        let updated = repo.update(&id, &patch).unwrap();
        assert_eq!(updated.description, "dinner");
        assert!(updated.synced);
        assert!(updated.updated_at > stored.updated_at);

        assert!(matches!(
            repo.update(&id, &ExpensePatch::default()),
            Err(ServerError::InvalidRequest(_))
        ));

        repo.delete(&id).unwrap();
        assert!(matches!(
            repo.update(&id, &patch),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn create_validates_input() {
        let repo = ExpenseRepository::new();
        let mut new = lunch();
        new.description = String::new();
        assert!(matches!(
            repo.create(new),
            Err(ServerError::Validation(_))
        ));

        let mut future = lunch();
        future.date = Utc::now().date_naive() + Duration::days(2);
        assert!(repo.create(future).is_err());
    }

    #[test]
    fn export_csv_lists_live_records() {
        let repo = ExpenseRepository::new();
        repo.create(lunch()).unwrap();
        let mut older = lunch();
        older.description = "bus, downtown".into();
        older.category = "transport".parse().unwrap();
        older.date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        repo.create(older).unwrap();
        let gone = repo.create(lunch()).unwrap();
        repo.delete(gone.server_id().unwrap()).unwrap();

        let csv = repo.export_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "date,description,category,amount",
                "2024-05-10,lunch,food,12.50",
                "2024-05-01,\"bus, downtown\",transport,12.50",
            ]
        );
    }
}

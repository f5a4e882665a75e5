//! Add, edit and delete commands.

use chrono::{NaiveDate, Utc};
use spendsync_engine::{DeleteOutcome, RemoteRepository, SyncEngine};
use spendsync_protocol::{Amount, Category, Expense, ExpenseId, ExpensePatch, NewExpense};
use spendsync_storage::BlobStore;

/// Records a new expense dated `date`, or today.
pub fn add<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
    amount: Amount,
    category: Category,
    description: String,
    date: Option<NaiveDate>,
) -> Result<Expense, Box<dyn std::error::Error>> {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let expense = engine.add_expense(NewExpense::new(amount, category, description, date))?;
    println!(
        "Added {} ({} {} on {})",
        expense.id, expense.amount, expense.category, expense.date
    );
    Ok(expense)
}

/// Applies the given field changes to an expense.
pub fn edit<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
    id: &str,
    amount: Option<Amount>,
    category: Option<Category>,
    description: Option<String>,
    date: Option<NaiveDate>,
) -> Result<Expense, Box<dyn std::error::Error>> {
    let id: ExpenseId = id.parse()?;
    let patch = ExpensePatch {
        amount,
        category,
        description,
        date,
    };
    if patch.is_empty() {
        return Err("Nothing to change: pass --amount, --category, --description or --date".into());
    }
    let expense = engine.update_expense(&id, &patch)?;
    println!("Updated {}", expense.id);
    Ok(expense)
}

/// Deletes an expense.
pub fn delete<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
    id: &str,
) -> Result<DeleteOutcome, Box<dyn std::error::Error>> {
    let id: ExpenseId = id.parse()?;
    let outcome = engine.delete_expense(&id)?;
    match outcome {
        DeleteOutcome::Purged => println!("Deleted {id} (never synced, removed locally)"),
        DeleteOutcome::Tombstoned => println!("Deleted {id}"),
    }
    Ok(outcome)
}

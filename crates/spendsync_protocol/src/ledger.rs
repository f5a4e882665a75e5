//! User-facing views over a replica. Tombstones never appear here.

use crate::expense::{Category, Expense};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Returns the visible records, newest expense date first.
///
/// Records on the same date keep newest-created first.
#[must_use]
pub fn visible(records: &[Expense]) -> Vec<&Expense> {
    let mut shown: Vec<&Expense> = records.iter().filter(|e| e.is_visible()).collect();
    shown.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
    shown
}

/// Sum of all visible amounts.
#[must_use]
pub fn total(records: &[Expense]) -> Decimal {
    records
        .iter()
        .filter(|e| e.is_visible())
        .map(|e| e.amount.value())
        .sum()
}

/// Per-category sums of visible amounts. Categories with no visible
/// records are omitted.
#[must_use]
pub fn totals_by_category(records: &[Expense]) -> BTreeMap<Category, Decimal> {
    let mut totals = BTreeMap::new();
    for expense in records.iter().filter(|e| e.is_visible()) {
        *totals.entry(expense.category).or_insert(Decimal::ZERO) += expense.amount.value();
    }
    totals
}

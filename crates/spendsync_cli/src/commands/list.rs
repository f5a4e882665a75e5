//! List and totals commands.

use rust_decimal::Decimal;
use serde::Serialize;
use spendsync_engine::{RemoteRepository, SyncEngine};
use spendsync_protocol::{Category, Expense};
use spendsync_storage::BlobStore;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Per-category totals, as printed by `totals --format json`.
#[derive(Debug, Serialize)]
pub struct TotalsReport {
    /// Sum per category with at least one visible record.
    pub categories: BTreeMap<Category, Decimal>,
    /// Sum of all visible records.
    pub total: Decimal,
}

/// Runs the list command.
pub fn list<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
    category: Option<Category>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let expenses: Vec<Expense> = engine
        .expenses()
        .into_iter()
        .filter(|e| category.map_or(true, |c| e.category == c))
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&expenses)?);
        }
        _ => {
            print!("{}", render_list(&expenses));
        }
    }
    Ok(())
}

/// Runs the totals command.
pub fn totals<R: RemoteRepository, B: BlobStore>(
    engine: &SyncEngine<R, B>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = TotalsReport {
        categories: engine.totals_by_category(),
        total: engine.total(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print!("{}", render_totals(&report));
        }
    }
    Ok(())
}

/// Formats expenses as a table. Unsynced rows are marked with `*`.
pub fn render_list(expenses: &[Expense]) -> String {
    if expenses.is_empty() {
        return "No expenses.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<10}  {:<13}  {:>10}  {:<24}  ID",
        "DATE", "CATEGORY", "AMOUNT", "DESCRIPTION"
    );
    for e in expenses {
        let marker = if e.synced { ' ' } else { '*' };
        let _ = writeln!(
            out,
            "{marker} {:<10}  {:<13}  {:>10}  {:<24}  {}",
            e.date.to_string(),
            e.category.as_str(),
            e.amount.to_string(),
            truncate(&e.description, 24),
            e.id
        );
    }

    let pending = expenses.iter().filter(|e| !e.synced).count();
    if pending > 0 {
        let _ = writeln!(out, "\n* {pending} not yet synced");
    }
    out
}

/// Formats totals, one category per line.
pub fn render_totals(report: &TotalsReport) -> String {
    let mut out = String::new();
    for (category, amount) in &report.categories {
        let _ = writeln!(out, "{:<13}  {:>10}", category.as_str(), amount.to_string());
    }
    let _ = writeln!(out, "{:<13}  {:>10}", "TOTAL", report.total.to_string());
    out
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width - 1).collect();
        cut.push('~');
        cut
    }
}

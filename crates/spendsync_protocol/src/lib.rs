//! # spendsync protocol
//!
//! Record model, merge engine and wire messages for spendsync.
//!
//! This crate provides:
//! - [`Expense`] and its synchronization metadata
//! - [`ExpenseId`], the tagged provisional/assigned identity
//! - Boundary validation ([`NewExpense::validate`], [`ValidationError`])
//! - The last-writer-wins merge engine ([`reconcile`])
//! - Ledger views that exclude tombstones ([`visible`], [`totals_by_category`])
//! - JSON request/response messages shared by client and server
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod expense;
mod id;
mod ledger;
mod merge;
mod messages;

pub use error::ValidationError;
pub use expense::{bump_timestamp, Amount, Category, Expense, ExpensePatch, NewExpense};
pub use id::{ExpenseId, ProvisionalToken, ServerId};
pub use ledger::{total, totals_by_category, visible};
pub use merge::{reconcile, reconcile_with_report, MergeReport, Reconciliation, Resolution};
pub use messages::{DeleteResponse, ErrorBody, FetchResponse, PushRequest, PushResponse};

//! Last-writer-wins reconciliation of a local replica with a server replica.
//!
//! [`reconcile`] is pure and deterministic. It is used identically at
//! startup, on a timer, and on explicit request.
//!
//! # Rules
//!
//! For each local record:
//! - no server identity: kept as-is (local-only, still unsynced)
//! - server identity present on the remote side: the remote version wins
//!   when its `updated_at` is **greater than or equal to** the local one
//!   (the server breaks ties), including its `deleted` flag; otherwise the
//!   local version is kept and marked `synced = false` so it is pushed again
//! - server identity absent from the remote side: kept unchanged; absence
//!   never implies deletion
//!
//! Remote records that matched nothing locally are appended as
//! `synced = true`.
//!
//! A tombstone is therefore only undone by a strictly newer live version of
//! the same identity.

use crate::expense::Expense;
use crate::id::ServerId;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// How a single identity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local record without a server identity, kept.
    LocalOnly,
    /// Both sides had the identity; the remote version won.
    AcceptedRemote,
    /// Both sides had the identity; the strictly newer local version won.
    KeptLocal,
    /// Local record with a server identity the remote side did not return.
    Unmatched,
    /// Remote record with no local counterpart, adopted.
    AdoptedRemote,
}

/// Counts of each [`Resolution`] in one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Local-only records kept.
    pub local_only: usize,
    /// Identities where the remote version won.
    pub accepted_remote: usize,
    /// Identities where the local version won.
    pub kept_local: usize,
    /// Local records the remote side did not mention.
    pub unmatched: usize,
    /// Remote records adopted as new.
    pub adopted_remote: usize,
}

impl MergeReport {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::LocalOnly => self.local_only += 1,
            Resolution::AcceptedRemote => self.accepted_remote += 1,
            Resolution::KeptLocal => self.kept_local += 1,
            Resolution::Unmatched => self.unmatched += 1,
            Resolution::AdoptedRemote => self.adopted_remote += 1,
        }
    }

    /// Number of identities present on both sides.
    #[must_use]
    pub fn compared(&self) -> usize {
        self.accepted_remote + self.kept_local
    }

    /// Number of records in the result.
    #[must_use]
    pub fn total(&self) -> usize {
        self.local_only + self.accepted_remote + self.kept_local + self.unmatched + self.adopted_remote
    }
}

/// The reconciled record set and how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The unified record set: local order first, then adopted remote records.
    pub records: Vec<Expense>,
    /// Per-resolution counts.
    pub report: MergeReport,
}

/// Merges `local` with `remote` and returns the unified set.
///
/// See the [module documentation](self) for the rules.
#[must_use]
pub fn reconcile(local: &[Expense], remote: &[Expense]) -> Vec<Expense> {
    reconcile_with_report(local, remote).records
}

/// Like [`reconcile`], also reporting how each identity was resolved.
///
/// Remote records without a server identity cannot be indexed and are
/// ignored. If the remote side lists an identity more than once, the entry
/// with the greatest `updated_at` is used (the later entry on ties).
#[must_use]
pub fn reconcile_with_report(local: &[Expense], remote: &[Expense]) -> Reconciliation {
    let mut index: HashMap<&ServerId, &Expense> = HashMap::with_capacity(remote.len());
    for record in remote {
        let Some(id) = record.server_id() else {
            continue;
        };
        match index.entry(id) {
            Entry::Occupied(mut slot) => {
                if record.updated_at >= slot.get().updated_at {
                    slot.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    let mut report = MergeReport::default();
    let mut matched: HashSet<&ServerId> = HashSet::with_capacity(index.len());
    let mut records = Vec::with_capacity(local.len() + index.len());

    for ours in local {
        let Some(id) = ours.server_id() else {
            records.push(ours.clone());
            report.record(Resolution::LocalOnly);
            continue;
        };

        match index.get(id) {
            Some(theirs) => {
                matched.insert(id);
                if theirs.updated_at >= ours.updated_at {
                    records.push((*theirs).clone().into_synced());
                    report.record(Resolution::AcceptedRemote);
                } else {
                    let mut kept = ours.clone();
                    kept.synced = false;
                    records.push(kept);
                    report.record(Resolution::KeptLocal);
                }
            }
            None => {
                records.push(ours.clone());
                report.record(Resolution::Unmatched);
            }
        }
    }

    for record in remote {
        let Some(id) = record.server_id() else {
            continue;
        };
        if matched.insert(id) {
            if let Some(winner) = index.get(id) {
                records.push((*winner).clone().into_synced());
                report.record(Resolution::AdoptedRemote);
            }
        }
    }

    Reconciliation { records, report }
}

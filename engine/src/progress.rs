//! Progress reporting trait.
//!
//! This module defines the LedgerObserver trait, which decouples the ledger
//! runner from whatever presents its progress (CLI summary, tests, ...).

use uuid::Uuid;

use crate::error::EntryError;
use crate::model::{CopyReport, ManifestEntry, RunReport};

/// Trait for receiving progress updates from a ledger run.
///
/// All methods are called synchronously, in manifest order.
pub trait LedgerObserver {
    /// Called once before the first entry.
    fn on_run_started(&self, run_id: Uuid, total_entries: usize);

    /// Called when an entry is about to be checked and backed up.
    fn on_entry_started(&self, index: usize, entry: &ManifestEntry);

    /// Called when an entry is done (backed up, skipped as unmounted, or failed).
    fn on_entry_completed(
        &self,
        index: usize,
        entry: &ManifestEntry,
        result: &Result<CopyReport, EntryError>,
    );

    /// Called after the last entry.
    fn on_run_completed(&self, report: &RunReport);
}

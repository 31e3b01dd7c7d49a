//! Core data model for ledger runs.
//!
//! This module defines the main data structures:
//! - ManifestEntry: one (source, destination) pair read from the ledger
//! - CopyDecision: what happens to a single file
//! - CopyReport: counters for one successful entry
//! - EntryOutcome, RunReport: the recorded result of a whole ledger run

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::EntryError;

/// A single backup job from the ledger.
///
/// Columns are matched by header name, so their order in the file is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "Source")]
    pub source: PathBuf,

    #[serde(rename = "Destination")]
    pub destination: PathBuf,
}

impl ManifestEntry {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        ManifestEntry {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// What the engine does with one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDecision {
    /// Destination missing; write a new file
    Create,
    /// Destination exists with different content; replace it
    Overwrite,
    /// Destination already holds identical bytes; leave it alone
    Skip,
}

impl std::fmt::Display for CopyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyDecision::Create => write!(f, "create"),
            CopyDecision::Overwrite => write!(f, "overwrite"),
            CopyDecision::Skip => write!(f, "skip"),
        }
    }
}

/// Counters for one `copy` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub dirs_created: usize,
    pub files_created: usize,
    pub files_overwritten: usize,
    pub files_skipped: usize,
    pub bytes_copied: u64,
}

impl CopyReport {
    /// Record a file-level decision.
    pub fn record(&mut self, decision: CopyDecision, bytes: u64) {
        match decision {
            CopyDecision::Create => self.files_created += 1,
            CopyDecision::Overwrite => self.files_overwritten += 1,
            CopyDecision::Skip => self.files_skipped += 1,
        }
        self.bytes_copied += bytes;
    }

    /// Number of files written (created or overwritten).
    pub fn files_written(&self) -> usize {
        self.files_created + self.files_overwritten
    }
}

/// The recorded result of one ledger entry.
#[derive(Debug)]
pub struct EntryOutcome {
    pub entry: ManifestEntry,
    pub result: Result<CopyReport, EntryError>,
}

impl EntryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A whole ledger run, in manifest order.
#[derive(Debug)]
pub struct RunReport {
    /// Unique identifier for this run
    pub id: Uuid,

    pub started_at: DateTime<Local>,

    pub finished_at: Option<DateTime<Local>>,

    /// One outcome per ledger entry, in the order the entries were read
    pub outcomes: Vec<EntryOutcome>,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            finished_at: None,
            outcomes: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True when every entry was backed up. An empty ledger counts as success.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(EntryOutcome::is_success)
    }

    /// Sum of the counters of all successful entries.
    pub fn totals(&self) -> CopyReport {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .fold(CopyReport::default(), |mut acc, r| {
                acc.dirs_created += r.dirs_created;
                acc.files_created += r.files_created;
                acc.files_overwritten += r.files_overwritten;
                acc.files_skipped += r.files_skipped;
                acc.bytes_copied += r.bytes_copied;
                acc
            })
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

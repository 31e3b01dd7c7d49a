//! Ledger reading and the batch runner.
//!
//! The ledger is a CSV file with a header row naming at least `Source` and
//! `Destination`. The runner walks its entries in order, skips those whose
//! destination volume is not mounted, and backs up the rest. Each entry's
//! outcome is a `Result`; none of them can stop the batch.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::Local;

use crate::error::{EntryError, ManifestError};
use crate::mirror::Backup;
use crate::model::{CopyReport, EntryOutcome, ManifestEntry, RunReport};
use crate::mount::MountChecker;
use crate::progress::LedgerObserver;

pub const SOURCE_COLUMN: &str = "Source";
pub const DESTINATION_COLUMN: &str = "Destination";

/// Read every entry of the ledger at `path`.
///
/// # Errors
/// Any unreadable file, missing column or malformed row fails the whole read.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let file = File::open(path).map_err(|e| ManifestError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_manifest(file)
}

/// Parse ledger rows from any reader.
pub fn parse_manifest<R: Read>(reader: R) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| ManifestError::Header { source: e })?;
    for column in [SOURCE_COLUMN, DESTINATION_COLUMN] {
        if !headers.iter().any(|h| h == column) {
            return Err(ManifestError::MissingColumn { column });
        }
    }

    let mut entries = Vec::new();
    for (index, row) in reader.deserialize::<ManifestEntry>().enumerate() {
        let entry = row.map_err(|e| ManifestError::Row {
            row: index + 1,
            source: e,
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

/// Check and back up a single entry.
pub fn run_entry(
    entry: &ManifestEntry,
    engine: &dyn Backup,
    checker: &dyn MountChecker,
) -> Result<CopyReport, EntryError> {
    tracing::info!("Source Path: {}", entry.source.display());
    tracing::info!("Destination Path: {}", entry.destination.display());
    tracing::debug!("checking the destination drive is mounted");

    if !checker.is_mounted(&entry.destination) {
        return Err(EntryError::MountUnavailable {
            path: entry.destination.clone(),
        });
    }

    Ok(engine.copy(&entry.source, &entry.destination)?)
}

/// Run every entry in manifest order.
///
/// Individual entry failures are logged and recorded in the returned
/// report but never stop the run.
pub fn run_ledger<I>(
    entries: I,
    engine: &dyn Backup,
    checker: &dyn MountChecker,
    observer: Option<&dyn LedgerObserver>,
) -> RunReport
where
    I: IntoIterator<Item = ManifestEntry>,
{
    let entries: Vec<ManifestEntry> = entries.into_iter().collect();
    let mut report = RunReport::new();

    tracing::info!(run = %report.id, entries = entries.len(), "reading ledger data");
    if let Some(observer) = observer {
        observer.on_run_started(report.id, entries.len());
    }

    for (index, entry) in entries.into_iter().enumerate() {
        if let Some(observer) = observer {
            observer.on_entry_started(index, &entry);
        }

        let result = run_entry(&entry, engine, checker);
        match &result {
            Ok(_) => {}
            Err(EntryError::MountUnavailable { path }) => {
                tracing::error!("Destination Drive is not mounted: {}", path.display());
            }
            Err(EntryError::Backup(e)) => {
                tracing::error!(
                    "Exception occurred while copying Source Path: {}, to Destination Path: {}. Message: {}",
                    entry.source.display(),
                    entry.destination.display(),
                    e
                );
            }
        }

        if let Some(observer) = observer {
            observer.on_entry_completed(index, &entry, &result);
        }
        report.outcomes.push(EntryOutcome { entry, result });
    }

    report.finished_at = Some(Local::now());
    tracing::info!(
        run = %report.id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "ledger run complete"
    );
    if let Some(observer) = observer {
        observer.on_run_completed(&report);
    }

    report
}

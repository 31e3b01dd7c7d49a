//! Error types for the backup engine.
//!
//! Errors are split by how far they are allowed to travel:
//! - `BackupError` and `EntryError` stay inside a single ledger entry. The
//!   runner records them and moves on to the next entry.
//! - `ManifestError` and `ConfigError` are fatal to the run and propagate to
//!   the process boundary before any backup starts.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::checksums::ChecksumAlgorithm;

/// A single file or directory below the copy root that could not be replicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Source path of the item that failed
    pub path: PathBuf,

    /// OS error code, when the failure came from the OS
    pub error_code: Option<i32>,

    /// Human-readable error message
    pub message: String,
}

impl FileFailure {
    pub fn from_error(path: PathBuf, err: &BackupError) -> Self {
        FileFailure {
            path,
            error_code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// Errors raised while copying one source tree into one destination.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    #[error("failed to enumerate directory {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// The destination of a file exists but is a directory
    #[error("destination is a directory, expected a file: {}", path.display())]
    NotAFile { path: PathBuf },

    /// Sockets, FIFOs, device nodes: anything that is neither a file nor a directory
    #[error("not a regular file or directory: {}", path.display())]
    SpecialFile { path: PathBuf },

    #[error("{algorithm} verification failed: {} differs from its source", path.display())]
    VerificationFailed {
        path: PathBuf,
        algorithm: ChecksumAlgorithm,
    },

    /// The walk finished but some items below the root failed
    #[error(
        "{} item(s) under {} could not be backed up; first failure: {}",
        failures.len(),
        root.display(),
        failures.first().map(|f| f.message.as_str()).unwrap_or("unknown")
    )]
    Incomplete {
        root: PathBuf,
        failures: Vec<FileFailure>,
    },
}

impl BackupError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Outcome of a ledger entry that did not complete.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("destination drive is not mounted: {}", path.display())]
    MountUnavailable { path: PathBuf },

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Errors reading the ledger. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to open ledger {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read ledger header: {source}")]
    Header { source: csv::Error },

    #[error("ledger is missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("malformed ledger row {row}: {source}")]
    Row { row: usize, source: csv::Error },
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

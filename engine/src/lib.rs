//! # SafeGuard Engine - Ledger-Driven Backup Library
//!
//! A headless backup engine that replicates directories listed in a ledger
//! onto local or external volumes. Designed as the foundation for the CLI
//! and any future front end.
//!
//! ## Overview
//!
//! - Ledger of (Source, Destination) pairs read from CSV
//! - Destinations on external volumes are only written while mounted
//! - Additive merge-copy: creates and updates, never deletes
//! - Files with identical bytes are skipped without touching their metadata
//! - Per-entry error isolation: one failed entry never stops the run
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use safeguard_engine::{read_manifest, run_ledger, MirrorEngine, VolumeMountChecker};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let entries = read_manifest(Path::new("data_transfer_ledger.csv"))?;
//! let engine = MirrorEngine::new();
//! let checker = VolumeMountChecker::platform_default();
//!
//! let report = run_ledger(entries, &engine, &checker, None);
//! println!("{} succeeded, {} failed", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (ManifestEntry, CopyDecision, reports)
//! - **error**: Error types and handling
//! - **fs_ops**: Low-level filesystem operations
//! - **mirror**: The backup engine
//! - **mount**: Mount detection for destinations
//! - **ledger**: Ledger parsing and the batch runner
//! - **progress**: Progress observer trait
//! - **checksums**: Verify-after-copy checksums
//! - **config**: TOML configuration

pub mod checksums;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod ledger;
pub mod mirror;
pub mod model;
pub mod mount;
pub mod progress;

// Re-export main types and functions
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use config::{LoggingConfig, MountConfig, SafeGuardConfig};
pub use error::{BackupError, ConfigError, EntryError, FileFailure, ManifestError};
pub use ledger::{parse_manifest, read_manifest, run_entry, run_ledger};
pub use mirror::{Backup, MirrorEngine};
pub use model::{CopyDecision, CopyReport, EntryOutcome, ManifestEntry, RunReport};
pub use mount::{select_checker, AlwaysMounted, MountChecker, MountRoot, VolumeMountChecker};
pub use progress::LedgerObserver;

//! SafeGuard - Command-line entry point for ledger-driven backups.
//!
//! Reads the ledger, backs up every entry whose destination is available,
//! logs to stderr and a rotating log file, and prints a summary.
//!
//! Exit status: 0 when every entry was backed up, 1 when any entry failed or
//! was skipped, 2 when the run could not start (config, logging, ledger).

mod logging;

use anyhow::{bail, Context};
use clap::Parser;
use safeguard_engine::{
    read_manifest, run_ledger, select_checker, ChecksumAlgorithm, CopyReport, EntryError,
    LedgerObserver, ManifestEntry, MirrorEngine, RunReport, SafeGuardConfig,
};
use std::path::PathBuf;
use uuid::Uuid;

/// SafeGuard - back up directories listed in a ledger
#[derive(Parser, Debug)]
#[command(name = "safeguard")]
#[command(version = "0.1.0")]
#[command(about = "Back up every Source to its Destination listed in a CSV ledger")]
struct Args {
    /// Ledger CSV with Source and Destination columns
    #[arg(long, value_name = "PATH")]
    ledger: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log file (rotated by size)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable verbose output and debug logging
    #[arg(long)]
    verbose: bool,

    /// Enable verification after copy (compares checksums)
    #[arg(long)]
    verify: bool,

    /// Checksum algorithm for verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256", requires = "verify")]
    hash: String,

    /// Treat every destination as mounted
    #[arg(long)]
    no_mount_check: bool,
}

/// CLI implementation of LedgerObserver for displaying run progress
struct CliProgress {
    verbose: bool,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress { verbose }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

impl LedgerObserver for CliProgress {
    fn on_run_started(&self, run_id: Uuid, total_entries: usize) {
        eprintln!("Run {}: {} ledger entries", run_id, total_entries);
    }

    fn on_entry_started(&self, index: usize, entry: &ManifestEntry) {
        if self.verbose {
            eprintln!(
                "[{:3}] Starting: {} -> {}",
                index,
                entry.source.display(),
                entry.destination.display()
            );
        }
    }

    fn on_entry_completed(
        &self,
        index: usize,
        _entry: &ManifestEntry,
        result: &Result<CopyReport, EntryError>,
    ) {
        if self.verbose {
            let status = match result {
                Ok(_) => "Done",
                Err(EntryError::MountUnavailable { .. }) => "Not mounted",
                Err(EntryError::Backup(_)) => "Failed",
            };
            eprintln!("[{:3}] {}", index, status);
        }
    }

    fn on_run_completed(&self, report: &RunReport) {
        let totals = report.totals();

        eprintln!();
        eprintln!(
            "Summary: {} backed up, {} failed",
            report.succeeded(),
            report.failed()
        );
        eprintln!(
            "Files: {} created, {} overwritten, {} unchanged",
            totals.files_created, totals.files_overwritten, totals.files_skipped
        );
        eprintln!("Bytes copied: {}", Self::format_bytes(totals.bytes_copied));
        if let Some(finished_at) = report.finished_at {
            let elapsed = finished_at - report.started_at;
            eprintln!("Elapsed: {}s", elapsed.num_seconds());
        }

        if report.failed() > 0 {
            eprintln!();
            eprintln!("Failed entries:");
            for outcome in &report.outcomes {
                if let Err(e) = &outcome.result {
                    eprintln!("  {}: {}", outcome.entry.source.display(), e);
                }
            }
        }
    }
}

/// Parse arguments, run the ledger and map the outcome to an exit code
fn main() {
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(report) if report.all_succeeded() => 0,
        Ok(_) => 1,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Merge the config file (if any) with command-line overrides
fn resolve_config(args: &Args) -> anyhow::Result<SafeGuardConfig> {
    let mut config = match &args.config {
        Some(path) => SafeGuardConfig::load(path)?,
        None => SafeGuardConfig::default(),
    };

    if let Some(ledger) = &args.ledger {
        config.ledger = ledger.clone();
    }
    if let Some(log_file) = &args.log_file {
        config.logging.file = log_file.clone();
    }
    if args.verify {
        match ChecksumAlgorithm::parse(&args.hash) {
            Some(algorithm) => config.verify = Some(algorithm),
            None => bail!(
                "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                args.hash
            ),
        }
    }
    if args.no_mount_check {
        config.mount.roots.clear();
    }

    Ok(config)
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> anyhow::Result<RunReport> {
    let config = resolve_config(args)?;
    let subscriber = logging::build_subscriber(&config.logging, args.verbose)?;

    tracing::subscriber::with_default(subscriber, || -> anyhow::Result<RunReport> {
        let entries = match read_manifest(&config.ledger) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Cannot read ledger {}: {}", config.ledger.display(), e);
                return Err(e).context("ledger could not be read; no backups were attempted");
            }
        };

        let engine = MirrorEngine::new().with_verification(config.verify);
        let checker = select_checker(&config.mount.roots);
        let progress = CliProgress::new(args.verbose);

        Ok(run_ledger(
            entries,
            &engine,
            checker.as_ref(),
            Some(&progress),
        ))
    })
}
